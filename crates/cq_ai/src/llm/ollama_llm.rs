use std::io;
use std::time::Duration;

use cq_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use super::{GenerationOptions, Llm};
use crate::ollama::OllamaClient;

#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: OllamaClient,
    request_timeout: Duration,
}

impl OllamaLlm {
    pub fn new(client: OllamaClient, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
}

fn is_timeout(kind: io::ErrorKind) -> bool {
    // Socket read timeouts surface as WouldBlock on some platforms.
    matches!(kind, io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

fn transport_error(e: ureq::Error) -> AppError {
    let timed_out = std::error::Error::source(&e)
        .and_then(|s| s.downcast_ref::<io::Error>())
        .is_some_and(|ioe| is_timeout(ioe.kind()));
    let details = e.to_string();
    if timed_out {
        return AppError::new(
            codes::GENERATION_TIMEOUT,
            "The language model did not answer in time",
        )
        .with_details(details)
        .with_retryable(true);
    }
    AppError::new(
        codes::GENERATION_UNAVAILABLE,
        "Failed to call the language model",
    )
    .with_details(details)
    .with_retryable(true)
}

impl Llm for OllamaLlm {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, AppError> {
        let url = format!("{}/api/generate", self.client.base_url());
        let req = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: options.temperature,
                num_predict: options.max_output_tokens,
            },
        };

        let body = serde_json::to_value(req).map_err(|e| {
            AppError::new(codes::GENERATION_UNAVAILABLE, "Failed to encode generate request")
                .with_details(e.to_string())
        })?;
        let resp = ureq::post(&url).timeout(self.request_timeout).send_json(body);

        match resp {
            Ok(r) if r.status() == 200 => {
                let v: GenerateResponse = r.into_json().map_err(|e| {
                    if is_timeout(e.kind()) {
                        return AppError::new(
                            codes::GENERATION_TIMEOUT,
                            "The language model did not answer in time",
                        )
                        .with_details(e.to_string())
                        .with_retryable(true);
                    }
                    AppError::new(
                        codes::GENERATION_UNAVAILABLE,
                        "Failed to decode generate response",
                    )
                    .with_details(e.to_string())
                })?;
                if v.response.trim().is_empty() {
                    return Err(AppError::new(
                        codes::GENERATION_UNAVAILABLE,
                        "The language model returned an empty answer",
                    ));
                }
                Ok(v.response)
            }
            Ok(r) => Err(
                AppError::new(codes::GENERATION_UNAVAILABLE, "Generate request failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(e) => Err(transport_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn request_carries_sampling_options() {
        let req = GenerateRequest {
            model: "llama3.1",
            prompt: "q",
            stream: false,
            options: GenerateOptions {
                temperature: 0.5,
                num_predict: 256,
            },
        };
        let v = serde_json::to_value(req).expect("encode");
        assert_eq!(v["stream"], serde_json::json!(false));
        assert_eq!(v["options"]["num_predict"], serde_json::json!(256));
        assert_eq!(v["options"]["temperature"], serde_json::json!(0.5));
    }

    #[test]
    fn silent_server_maps_to_generation_timeout() {
        // The kernel completes the handshake, but nothing ever answers.
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let client = OllamaClient::new(&format!("http://127.0.0.1:{port}")).expect("client");
        let llm = OllamaLlm::new(client, Duration::from_millis(200));

        let err = llm
            .generate("llama3.1", "q", &GenerationOptions::default())
            .expect_err("no answer");
        assert_eq!(err.code, codes::GENERATION_TIMEOUT);
        assert!(err.retryable);
        drop(listener);
    }

    #[test]
    fn refused_connection_is_unavailable_not_timeout() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let client = OllamaClient::new(&format!("http://127.0.0.1:{port}")).expect("client");
        let llm = OllamaLlm::new(client, Duration::from_secs(2));

        let err = llm
            .generate("llama3.1", "q", &GenerationOptions::default())
            .expect_err("refused");
        assert_eq!(err.code, codes::GENERATION_UNAVAILABLE);
    }

    #[test]
    fn timeout_kinds_are_recognized() {
        assert!(is_timeout(io::ErrorKind::TimedOut));
        assert!(is_timeout(io::ErrorKind::WouldBlock));
        assert!(!is_timeout(io::ErrorKind::ConnectionRefused));
    }
}
