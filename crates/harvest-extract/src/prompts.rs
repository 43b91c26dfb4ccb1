pub const EXTRACTION_SYSTEM: &str = "You extract structured data from the content of web pages. \
Reply with JSON only, without commentary. When nothing relevant is found reply with an empty array [].";

pub const SCHEMA_SYSTEM: &str = "You write CSS extraction schemas for HTML pages. \
Reply with a single JSON object only, without commentary.";

pub const SCHEMA_FORMAT: &str = r#"The schema is a JSON object of this shape:
{
  "name": "<what is extracted>",
  "baseSelector": "<CSS selector of each repeated item>",
  "baseFields": [ <fields read on the base element itself, optional> ],
  "fields": [ <fields> ]
}
Each field is an object with:
  "name": output key,
  "selector": CSS selector relative to the enclosing element (omit to use the element itself),
  "type": one of "text", "attribute", "html", "regex", "nested", "list", "nested_list",
  "attribute": attribute name, required for type "attribute",
  "pattern": regular expression, required for type "regex" (first capture group is kept),
  "fields": sub fields, required for "nested" (first match), "list" and "nested_list" (every match),
  "default": value used when nothing matches (optional),
  "transform": one of "lowercase", "uppercase", "strip" (optional).
Use selectors that are stable (classes, ids, tag structure) and avoid matching empty elements."#;

pub fn extraction_request(
    location: &str,
    content: &str,
    instruction: &str,
    schema: Option<&serde_json::Value>,
) -> String {
    let mut prompt = format!(
        "Page: {location}\n\n<content>\n{content}\n</content>\n\nInstruction: {instruction}\n"
    );
    if let Some(schema) = schema {
        prompt.push_str(
            "\nReturn a JSON array where every element follows this JSON schema:\n",
        );
        prompt.push_str(&schema.to_string());
        prompt.push('\n');
    } else {
        prompt.push_str("\nReturn a JSON array of objects.\n");
    }
    prompt
}

pub fn schema_request(sample_html: &str, query: Option<&str>) -> String {
    let mut prompt = format!("{SCHEMA_FORMAT}\n\nSample HTML:\n<html_sample>\n{sample_html}\n</html_sample>\n");
    if let Some(query) = query {
        prompt.push_str("\nRequirements: ");
        prompt.push_str(query.trim());
        prompt.push('\n');
    }
    prompt
}
