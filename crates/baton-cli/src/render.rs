use bat::WrappingMode;
use baton::models::message::Message;
use baton::models::role::Role;
use baton::models::tool::ToolCallRequest;
use baton::swarm::Response;
use console::style;
use serde_json::Value;

const THEME: &str = "zenburn";
const MAX_STRING_LENGTH: usize = 40;
const MAX_RESULT_LINES: usize = 20;
const INDENT: &str = "    ";

fn print_markdown(content: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme(THEME)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print();
    if let Err(e) = printed {
        tracing::debug!("Falling back to plain output: {}", e);
        println!("{}", content);
    }
}

/// Print tool arguments recursively, shortening long strings
fn print_params(value: &Value, depth: usize) {
    let indent = INDENT.repeat(depth);

    match value {
        Value::Object(map) => {
            for (key, val) in map {
                match val {
                    Value::Object(_) | Value::Array(_) => {
                        println!("{}{}:", indent, style(key).dim());
                        print_params(val, depth + 1);
                    }
                    Value::String(s) if s.len() > MAX_STRING_LENGTH => {
                        println!(
                            "{}{}: {}",
                            indent,
                            style(key).dim(),
                            style(format!("[{} chars]", s.len())).yellow()
                        );
                    }
                    Value::String(s) => {
                        println!("{}{}: {}", indent, style(key).dim(), style(s).green());
                    }
                    other => {
                        println!("{}{}: {}", indent, style(key).dim(), style(other).blue());
                    }
                }
            }
        }
        Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                println!("{}{}.", indent, i + 1);
                print_params(item, depth + 1);
            }
        }
        Value::String(s) => println!("{}{}", indent, style(s).green()),
        other => println!("{}{}", indent, style(other).blue()),
    }
}

fn render_tool_call(call: &ToolCallRequest) {
    println!(
        "{} {}",
        style("tool").magenta().dim(),
        style(&call.name).cyan().bold()
    );
    match serde_json::from_str::<Value>(&call.arguments) {
        Ok(arguments) => print_params(&arguments, 1),
        Err(_) => println!("{}{}", INDENT, style(&call.arguments).red()),
    }
}

fn render_tool_result(message: &Message) {
    let lines: Vec<&str> = message.content.lines().collect();
    for line in lines.iter().take(MAX_RESULT_LINES) {
        println!("{}{}", INDENT, style(line).dim());
    }
    if lines.len() > MAX_RESULT_LINES {
        println!(
            "{}{}",
            INDENT,
            style(format!("... {} more lines", lines.len() - MAX_RESULT_LINES)).dim()
        );
    }
    println!();
}

/// Render a message appended during the run. With streaming on, assistant
/// text was already printed chunk by chunk.
pub fn render_message(message: &Message, streamed: bool) {
    match message.role {
        Role::Assistant => {
            if !streamed && !message.content.is_empty() {
                if let Some(sender) = &message.sender {
                    println!("{}", style(sender).green().bold());
                }
                print_markdown(&message.content);
                println!();
            }
            for call in &message.tool_calls {
                render_tool_call(call);
            }
        }
        Role::Tool => render_tool_result(message),
        Role::System | Role::User => {}
    }
}

pub fn render_summary(response: &Response) {
    println!(
        "{}",
        style(format!(
            "{} messages, finished with agent {}",
            response.messages.len(),
            response.agent.name
        ))
        .dim()
    );
}
