use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use reqwest_eventsource::{Error as EventSourceError, Event, EventSource};
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{CompletionChunk, CompletionRequest, CompletionStream, Provider, ProviderError, Usage};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, messages_to_openai_spec, openai_chunk_to_delta,
    openai_response_to_message, tools_to_openai_spec, usage_from_response,
};
use crate::models::message::Message;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    fn build_payload(&self, request: &CompletionRequest, stream: bool) -> Result<Value, ProviderError> {
        let mut payload = json!({
            "model": request.model,
            "messages": messages_to_openai_spec(&request.messages),
        });
        let object = payload
            .as_object_mut()
            .ok_or_else(|| ProviderError::InvalidRequest("payload is not an object".into()))?;

        if !request.tools.is_empty() {
            object.insert("tools".to_string(), json!(tools_to_openai_spec(&request.tools)?));
            object.insert(
                "parallel_tool_calls".to_string(),
                json!(request.parallel_tool_calls),
            );
        }
        if let Some(tool_choice) = &request.tool_choice {
            object.insert("tool_choice".to_string(), json!(tool_choice));
        }
        if let Some(temp) = self.config.temperature {
            object.insert("temperature".to_string(), json!(temp));
        }
        if let Some(tokens) = self.config.max_tokens {
            object.insert("max_tokens".to_string(), json!(tokens));
        }
        if stream {
            object.insert("stream".to_string(), json!(true));
        }

        Ok(payload)
    }

    fn request(&self, payload: &Value) -> RequestBuilder {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        self.client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(payload)
    }

    async fn post(&self, payload: &Value) -> Result<Response, ProviderError> {
        let response = self.request(payload).send().await?;

        match response.status() {
            StatusCode::OK => Ok(response),
            status => Err(status_error(status, response).await),
        }
    }
}

async fn status_error(status: StatusCode, response: Response) -> ProviderError {
    let body = response.text().await.unwrap_or_default();
    if let Ok(error) = serde_json::from_str::<Value>(&body) {
        if let Some(err) = error.get("error").and_then(check_openai_context_length_error) {
            return err;
        }
    }
    ProviderError::Status {
        status: status.as_u16(),
        body,
    }
}

async fn event_source_error(error: EventSourceError) -> ProviderError {
    match error {
        EventSourceError::Transport(e) => ProviderError::Http(e),
        EventSourceError::InvalidStatusCode(status, response) => {
            status_error(status, response).await
        }
        other => ProviderError::InvalidResponse(other.to_string()),
    }
}

fn parse_chunk(data: &str) -> Result<CompletionChunk, ProviderError> {
    let chunk: Value = serde_json::from_str(data)
        .map_err(|e| ProviderError::InvalidResponse(format!("{}: {}", e, data)))?;
    if let Some(error) = chunk.get("error") {
        return Err(check_openai_context_length_error(error)
            .unwrap_or_else(|| ProviderError::Api(error.to_string())));
    }
    Ok(openai_chunk_to_delta(&chunk))
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<(Message, Usage), ProviderError> {
        let payload = self.build_payload(request, false)?;
        tracing::debug!(model = %request.model, messages = request.messages.len(), tools = request.tools.len(), "Requesting completion");

        let response: Value = self.post(&payload).await?.json().await?;

        // Raise specific error if context length is exceeded
        if let Some(error) = response.get("error") {
            if let Some(err) = check_openai_context_length_error(error) {
                return Err(err);
            }
            return Err(ProviderError::Api(error.to_string()));
        }

        let message = openai_response_to_message(&response)?;
        let usage = usage_from_response(&response);
        Ok((message, usage))
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<CompletionStream, ProviderError> {
        let payload = self.build_payload(request, true)?;
        tracing::debug!(model = %request.model, messages = request.messages.len(), tools = request.tools.len(), "Requesting streamed completion");

        let mut source = EventSource::new(self.request(&payload))
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;

        let chunks: CompletionStream = Box::pin(async_stream::try_stream! {
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(message)) => {
                        if message.data.trim() == "[DONE]" {
                            break;
                        }
                        yield parse_chunk(&message.data)?;
                    }
                    Err(EventSourceError::StreamEnded) => break,
                    Err(e) => {
                        // A closed source does not reconnect
                        source.close();
                        Err::<(), _>(event_source_error(e).await)?;
                    }
                }
            }
            source.close();
        });

        Ok(chunks)
    }
}
