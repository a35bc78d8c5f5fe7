// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use coach_llm::{AiConfig, Generation, GenerationFailure, Generator, TextGenerator};
use std::io::Read;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Response, Server};

struct Captured {
    url: String,
    method: String,
    api_key: Option<String>,
    body: serde_json::Value,
}

fn serve_once(status: u16, body: &'static str) -> Result<(String, thread::JoinHandle<Captured>)> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let base_url = format!("http://{}/v1beta", server.server_addr());

    let handle = thread::spawn(move || {
        let mut request = server.recv().expect("request expected");
        let api_key = request
            .headers()
            .iter()
            .find(|header| header.field.equiv("x-goog-api-key"))
            .map(|header| header.value.as_str().to_owned());
        let mut raw = String::new();
        request
            .as_reader()
            .read_to_string(&mut raw)
            .expect("request body should be readable");
        let captured = Captured {
            url: request.url().to_owned(),
            method: request.method().to_string(),
            api_key,
            body: serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null),
        };

        let response = Response::from_string(body)
            .with_status_code(status)
            .with_header(
                Header::from_bytes("Content-Type", "application/json")
                    .expect("valid content type header"),
            );
        request.respond(response).expect("response should succeed");
        captured
    });

    Ok((base_url, handle))
}

fn generator_for(base_url: &str) -> Result<Generator> {
    Generator::from_config(&AiConfig {
        api_key: Some("test-key".to_owned()),
        base_url: base_url.to_owned(),
        model: "gemini-test".to_owned(),
        timeout: Duration::from_secs(2),
    })
}

#[test]
fn generate_posts_prompt_with_key_and_safety_settings() -> Result<()> {
    let (base_url, handle) = serve_once(
        200,
        r#"{"candidates":[{"content":{"parts":[{"text":"Walk for 15 minutes after lunch.\n"}],"role":"model"},"finishReason":"STOP"}]}"#,
    )?;

    let generator = generator_for(&base_url)?;
    assert!(generator.is_configured());
    let generation = generator.generate("Suggest one task");
    assert_eq!(
        generation,
        Generation::Text("Walk for 15 minutes after lunch.".to_owned())
    );

    let captured = handle
        .join()
        .map_err(|_| anyhow!("server thread panicked"))?;
    assert_eq!(captured.method, "POST");
    assert_eq!(captured.url, "/v1beta/models/gemini-test:generateContent");
    assert_eq!(captured.api_key.as_deref(), Some("test-key"));
    assert_eq!(
        captured.body["contents"][0]["parts"][0]["text"],
        "Suggest one task"
    );
    let categories: Vec<&str> = captured.body["safetySettings"]
        .as_array()
        .map(|settings| {
            settings
                .iter()
                .filter_map(|setting| setting["category"].as_str())
                .collect()
        })
        .unwrap_or_default();
    assert_eq!(
        categories,
        vec![
            "HARM_CATEGORY_HARASSMENT",
            "HARM_CATEGORY_HATE_SPEECH",
            "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            "HARM_CATEGORY_DANGEROUS_CONTENT",
        ]
    );
    Ok(())
}

#[test]
fn blocked_prompt_reports_reason() -> Result<()> {
    let (base_url, handle) = serve_once(200, r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#)?;

    let generation = generator_for(&base_url)?.generate("something unsafe");
    assert_eq!(
        generation,
        Generation::Unavailable(GenerationFailure::Blocked("SAFETY".to_owned()))
    );
    let text = generation.into_text();
    assert!(coach_llm::is_unavailable_text(&text), "got {text}");
    assert!(text.contains("SAFETY"));

    handle
        .join()
        .map_err(|_| anyhow!("server thread panicked"))?;
    Ok(())
}

#[test]
fn error_status_becomes_api_failure_with_server_message() -> Result<()> {
    let (base_url, handle) = serve_once(
        403,
        r#"{"error":{"code":403,"message":"API key not valid.","status":"PERMISSION_DENIED"}}"#,
    )?;

    let generation = generator_for(&base_url)?.generate("hello");
    match generation.failure() {
        Some(GenerationFailure::Api(message)) => {
            assert!(message.contains("API key not valid."), "got {message}");
            assert!(message.contains("403"), "got {message}");
        }
        other => return Err(anyhow!("expected api failure, got {other:?}")),
    }

    handle
        .join()
        .map_err(|_| anyhow!("server thread panicked"))?;
    Ok(())
}

#[test]
fn undecodable_body_becomes_api_failure() -> Result<()> {
    let (base_url, handle) = serve_once(200, "not json at all")?;

    let generation = generator_for(&base_url)?.generate("hello");
    assert!(
        matches!(generation.failure(), Some(GenerationFailure::Api(_))),
        "got {generation:?}"
    );

    handle
        .join()
        .map_err(|_| anyhow!("server thread panicked"))?;
    Ok(())
}

#[test]
fn unreachable_endpoint_becomes_api_failure() -> Result<()> {
    let generator = Generator::from_config(&AiConfig {
        api_key: Some("test-key".to_owned()),
        base_url: "http://127.0.0.1:1/v1beta".to_owned(),
        model: "gemini-test".to_owned(),
        timeout: Duration::from_millis(200),
    })?;

    let text = generator.generate("hello").into_text();
    assert!(coach_llm::is_unavailable_text(&text), "got {text}");
    assert!(text.contains("127.0.0.1:1"), "got {text}");
    Ok(())
}
