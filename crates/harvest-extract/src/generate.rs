use anyhow::{Context, Result};
use serde_json::Value;

use crate::css::JsonCssExtractionStrategy;
use crate::llm::{parse_json_reply, ExtraArgs, LlmClient, Message};
use crate::prompts;

/// Asks the model for a CSS extraction schema matching `sample_html`.
///
/// The returned schema is guaranteed to build a [`JsonCssExtractionStrategy`].
pub async fn generate_schema(
    client: &LlmClient,
    sample_html: &str,
    query: Option<&str>,
    extra_args: &ExtraArgs,
) -> Result<Value> {
    let messages = [
        Message::system(prompts::SCHEMA_SYSTEM),
        Message::user(prompts::schema_request(sample_html, query)),
    ];

    let reply = client.complete(&messages, extra_args).await?;
    let schema = parse_json_reply(&reply)?;
    JsonCssExtractionStrategy::new(schema.clone())
        .with_context(|| format!("Generated schema is unusable: {schema}"))?;

    log::info!("Generated schema with {}", client.model());
    Ok(schema)
}
