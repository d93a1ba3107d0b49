//! LlmClient trait definition

use async_trait::async_trait;

use super::{CompletionRequest, CompletionResponse, LlmError};

/// Stateless LLM client - each call is independent
///
/// Plan retrieval issues exactly one `complete` per query; implementations
/// own any transport-level retry and time ceiling.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single completion request and wait for the full response
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::debug;

    /// Mock LLM client for unit tests
    pub struct MockLlmClient {
        responses: Vec<CompletionResponse>,
        call_count: AtomicUsize,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl MockLlmClient {
        pub fn new(responses: Vec<CompletionResponse>) -> Self {
            debug!(response_count = %responses.len(), "MockLlmClient::new: called");
            Self {
                responses,
                call_count: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Mock that replies once with the given text
        pub fn replying(text: &str) -> Self {
            Self::new(vec![CompletionResponse {
                content: Some(text.to_string()),
                ..Default::default()
            }])
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            debug!("MockLlmClient::complete: called");
            self.requests.lock().unwrap().push(request);
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(idx)
                .cloned()
                .ok_or_else(|| LlmError::InvalidResponse("No more mock responses".to_string()))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn request() -> CompletionRequest {
            CompletionRequest {
                system_prompt: "Test".to_string(),
                messages: vec![],
                max_tokens: 1000,
            }
        }

        #[tokio::test]
        async fn test_mock_client_returns_responses_in_order() {
            let client = MockLlmClient::new(vec![
                CompletionResponse {
                    content: Some("Response 1".to_string()),
                    ..Default::default()
                },
                CompletionResponse {
                    content: Some("Response 2".to_string()),
                    ..Default::default()
                },
            ]);

            let resp1 = client.complete(request()).await.unwrap();
            assert_eq!(resp1.content, Some("Response 1".to_string()));

            let resp2 = client.complete(request()).await.unwrap();
            assert_eq!(resp2.content, Some("Response 2".to_string()));

            assert_eq!(client.call_count(), 2);
        }

        #[tokio::test]
        async fn test_mock_client_errors_when_exhausted() {
            let client = MockLlmClient::new(vec![]);
            assert!(client.complete(request()).await.is_err());
        }
    }
}
