mod css;
mod generate;
mod llm;
mod prompts;

pub use css::{CssSchema, FieldKind, FieldSpec, JsonCssExtractionStrategy, Transform};
pub use generate::generate_schema;
pub use llm::{
    parse_json_reply, ExtraArgs, LlmClient, LlmConfig, LlmExtractionStrategy, Message,
};

pub use anyhow;
