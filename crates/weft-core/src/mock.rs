//! Scripted model client for deterministic tests.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::ProviderError;
use crate::messages::{Message, ToolCall};
use crate::provider::{ModelClient, ModelReply, SendOptions};

/// One scripted response.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Return this reply.
    Reply(ModelReply),
    /// Fail with this error.
    Error(ProviderError),
    /// Sleep, then produce the inner response.
    Delay(Duration, Box<MockResponse>),
    /// Never resolve. Used to exercise cancellation and timeouts.
    Hang,
}

impl MockResponse {
    /// Text-only reply.
    pub fn text(content: &str) -> Self {
        Self::Reply(ModelReply::text(content))
    }

    /// Reply that requests tool calls.
    #[must_use]
    pub fn tools(calls: Vec<ToolCall>) -> Self {
        Self::Reply(ModelReply::with_tools("", calls))
    }

    /// Wrap with a delay.
    #[must_use]
    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Model client that replays a script in order and records what it was sent.
#[derive(Default)]
pub struct MockModelClient {
    script: Mutex<VecDeque<MockResponse>>,
    received: Mutex<Vec<Vec<Message>>>,
}

impl MockModelClient {
    /// Client with the given script.
    #[must_use]
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Append more responses.
    pub fn push(&self, response: MockResponse) {
        self.script.lock().push_back(response);
    }

    /// Number of `send` calls so far.
    pub fn call_count(&self) -> usize {
        self.received.lock().len()
    }

    /// Message sequence passed to the `n`th call.
    pub fn request(&self, n: usize) -> Option<Vec<Message>> {
        self.received.lock().get(n).cloned()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn send(
        &self,
        messages: &[Message],
        _options: &SendOptions,
    ) -> Result<ModelReply, ProviderError> {
        self.received.lock().push(messages.to_vec());
        let next = self.script.lock().pop_front();
        let Some(mut response) = next else {
            return Err(ProviderError::InvalidRequest(
                "mock model client: script exhausted".into(),
            ));
        };
        loop {
            match response {
                MockResponse::Reply(reply) => return Ok(reply),
                MockResponse::Error(error) => return Err(error),
                MockResponse::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    response = *inner;
                }
                MockResponse::Hang => std::future::pending::<()>().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn replays_in_order_then_errors() {
        let client = MockModelClient::new(vec![MockResponse::text("one"), MockResponse::text("two")]);
        let opts = SendOptions::default();
        assert_eq!(client.send(&[], &opts).await.unwrap().content, "one");
        assert_eq!(client.send(&[], &opts).await.unwrap().content, "two");
        assert_matches!(
            client.send(&[], &opts).await,
            Err(ProviderError::InvalidRequest(_))
        );
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_response_resolves_after_sleep() {
        let client = MockModelClient::new(vec![MockResponse::delayed(
            Duration::from_secs(5),
            MockResponse::text("late"),
        )]);
        let reply = client.send(&[Message::user("hi")], &SendOptions::default()).await.unwrap();
        assert_eq!(reply.content, "late");
        assert_eq!(client.request(0).unwrap()[0].content, "hi");
    }
}
