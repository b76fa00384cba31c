use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::OutputFormat;

/// Print a success message, merging `data` into the JSON object when given
pub fn output_success(output_format: OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let (Some(Value::Object(fields)), Some(target)) = (data, response.as_object_mut()) {
                target.extend(fields);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Print a collection: pretty JSON, or one text line per item
pub fn output_collection<T: Serialize>(
    output_format: OutputFormat,
    collection_name: &str,
    items: &[T],
    header: &str,
    line: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ collection_name: items }))?);
        }
        OutputFormat::Text => {
            if items.is_empty() {
                println!("No {}", collection_name);
                return Ok(());
            }
            println!("{}", header);
            println!("{}", "-".repeat(header.len()));
            for item in items {
                println!("{}", line(item));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_collections_are_fine_in_both_formats() {
        let items: Vec<Value> = Vec::new();
        assert!(output_collection(OutputFormat::Text, "plans", &items, "TIER", |_| String::new()).is_ok());
        assert!(output_collection(OutputFormat::Json, "plans", &items, "TIER", |_| String::new()).is_ok());
    }
}
