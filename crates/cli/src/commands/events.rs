//! External event submission

use anyhow::Result;

use crate::client::{ApiClient, EventRequest, EventResponse};
use crate::output::{print_json, print_success, print_warning, OutputFormat};

/// Send an event to the agent's webhook
pub async fn send_event(
    client: &ApiClient,
    request: EventRequest,
    format: OutputFormat,
) -> Result<()> {
    let response: EventResponse = client.post("webhook/event", &request).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            if response.accepted {
                print_success(&format!(
                    "Event {}/{} recorded",
                    request.source, request.kind
                ));
            } else {
                print_warning("Agent ignored the event (source and kind must be non-empty)");
            }
        }
    }

    Ok(())
}
