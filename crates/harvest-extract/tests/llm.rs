use harvest_crawler::{ExtractionStrategy, PageLocation};
use harvest_extract::{generate_schema, ExtraArgs, LlmClient, LlmConfig, LlmExtractionStrategy};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COURSES: &str = r#"
    <html><body>
      <table class="schedule">
        <tr><td>CS 146</td><td>Data Structures and Algorithms</td><td>3</td></tr>
      </table>
      <script>tracking()</script>
    </body></html>
"#;

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    }))
}

fn client(server: &MockServer) -> LlmClient {
    let config = LlmConfig::new("openai/gpt-4o")
        .with_api_token("sk-test")
        .with_base_url(server.uri());
    LlmClient::new(&config).unwrap()
}

#[tokio::test]
async fn extraction_sends_page_text_and_schema() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "gpt-4o", "max_tokens": 2000})))
        .respond_with(completion(
            "```json\n{\"course_code\": \"CS 146\", \"units\": \"3\"}\n```",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let schema = json!({
        "type": "object",
        "properties": {"course_code": {"type": "string"}, "units": {"type": "string"}}
    });
    let strategy = LlmExtractionStrategy::with_client(client(&server), "Extract all courses")
        .with_schema(schema)
        .with_extra_args(ExtraArgs {
            temperature: Some(0.0),
            top_p: Some(0.9),
            max_tokens: Some(2000),
            ..Default::default()
        });

    let location = PageLocation::Url("https://www.sjsu.edu/classes/".into());
    let value = strategy.extract(COURSES, &location).await.unwrap();
    assert_eq!(value, json!([{"course_code": "CS 146", "units": "3"}]));

    let requests = server.received_requests().await.unwrap();
    let body: Value = requests[0].body_json().unwrap();
    let prompt = body["messages"][1]["content"].as_str().unwrap();
    assert!(prompt.contains("CS 146 Data Structures and Algorithms 3"));
    assert!(prompt.contains("Extract all courses"));
    assert!(prompt.contains("course_code"));
    assert!(!prompt.contains("tracking()"));
    assert_eq!(body["messages"][0]["role"], "system");
}

#[tokio::test]
async fn page_text_is_truncated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(completion("[]"))
        .expect(1)
        .mount(&server)
        .await;

    let strategy = LlmExtractionStrategy::with_client(client(&server), "Extract all courses")
        .with_max_content_chars(6);
    let location = PageLocation::Url("https://www.sjsu.edu/classes/".into());
    let value = strategy.extract(COURSES, &location).await.unwrap();
    assert_eq!(value, json!([]));

    let requests = server.received_requests().await.unwrap();
    let body: Value = requests[0].body_json().unwrap();
    let prompt = body["messages"][1]["content"].as_str().unwrap();
    assert!(prompt.contains("<content>\nCS 146\n</content>"));
    assert!(!prompt.contains("Data Structures"));
}

#[tokio::test]
async fn extra_headers_are_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-team", "research"))
        .respond_with(completion("[]"))
        .expect(1)
        .mount(&server)
        .await;

    let mut args = ExtraArgs::default();
    args.extra_headers.insert("X-Team".into(), "research".into());
    let strategy = LlmExtractionStrategy::with_client(client(&server), "anything")
        .with_extra_args(args);

    let location = PageLocation::Url("https://www.sjsu.edu/".into());
    let value = strategy.extract(COURSES, &location).await.unwrap();
    assert_eq!(value, json!([]));
}

#[tokio::test]
async fn api_error_fails_extraction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let strategy = LlmExtractionStrategy::with_client(client(&server), "anything");
    let location = PageLocation::Url("https://www.sjsu.edu/".into());
    let err = strategy.extract(COURSES, &location).await.unwrap_err();
    assert!(err.to_string().contains("invalid api key"));
}

#[tokio::test]
async fn generated_schema_is_validated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(completion(
            r#"{"name": "News", "baseSelector": "div.et_pb_text",
                "fields": [{"name": "paragraphs", "selector": "p", "type": "list",
                            "fields": [{"name": "text", "type": "text"}]}]}"#,
        ))
        .mount(&server)
        .await;

    let schema = generate_schema(
        &client(&server),
        "<div class=\"et_pb_text\"><p>Lorem ipsum</p></div>",
        Some("Generate a schema for this news div"),
        &ExtraArgs::default(),
    )
    .await
    .unwrap();

    assert_eq!(schema["baseSelector"], "div.et_pb_text");

    let requests = server.received_requests().await.unwrap();
    let body: Value = requests[0].body_json().unwrap();
    let prompt = body["messages"][1]["content"].as_str().unwrap();
    assert!(prompt.contains("<p>Lorem ipsum</p>"));
    assert!(prompt.contains("Generate a schema for this news div"));
}

#[tokio::test]
async fn unusable_generated_schema_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(completion(r#"{"fields": []}"#))
        .mount(&server)
        .await;

    let res = generate_schema(&client(&server), "<div></div>", None, &ExtraArgs::default()).await;
    assert!(res.is_err());
}
