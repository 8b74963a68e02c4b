//! These models represent the objects passed around by the run loop
//!
//! There are two related formats we need to interact with:
//! - openai-compatible messages/tools, sent from the run loop to the LLM
//! - tool call requests and results, exchanged between the run loop and tools
//!
//! Provider formats are always converted into these internal structs at the
//! adapter boundary, so the driver and executor never see raw provider JSON.
pub mod message;
pub mod role;
pub mod tool;
