use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::errors::SDKError;
use crate::types::Response;

/// Incremental output of a streamed request. A well-formed stream ends with
/// exactly one `Finish` carrying the assembled response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TextDelta { delta: String },
    Finish { response: Response },
}

pub type StreamEventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, SDKError>> + Send>>;

/// Replays a complete response as a stream, for adapters without native streaming.
pub fn stream_from_response(response: Response) -> StreamEventStream {
    let mut events = Vec::with_capacity(2);
    if !response.message.content.is_empty() {
        events.push(Ok(StreamEvent::TextDelta {
            delta: response.message.content.clone(),
        }));
    }
    events.push(Ok(StreamEvent::Finish { response }));
    Box::pin(futures::stream::iter(events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FinishReason, Message, Usage};
    use futures::StreamExt;

    fn response(text: &str) -> Response {
        Response {
            id: "resp-1".to_string(),
            model: "m".to_string(),
            provider: "p".to_string(),
            message: Message::assistant(text),
            finish_reason: FinishReason::stop(),
            usage: Usage::default(),
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn replayed_stream_emits_text_then_finish() {
        let events: Vec<StreamEvent> = stream_from_response(response("hello"))
            .map(|event| event.expect("event should be ok"))
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            StreamEvent::TextDelta {
                delta: "hello".to_string()
            }
        );
        assert!(matches!(events[1], StreamEvent::Finish { .. }));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn replayed_stream_skips_empty_text() {
        let events: Vec<StreamEvent> = stream_from_response(response(""))
            .map(|event| event.expect("event should be ok"))
            .collect()
            .await;
        assert_eq!(events.len(), 1);
    }
}
