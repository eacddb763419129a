//! Objects command - lists the objects a running server holds.

use std::time::Duration;

use serde::Deserialize;

use crate::cli::ObjectsArgs;
use crate::output::{OutputFormat, print_table};

#[derive(Debug, Deserialize, serde::Serialize)]
struct ObjectRow {
    name: String,
    subscribers: usize,
    created_at: String,
}

/// Run the objects command
pub async fn run(args: &ObjectsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let url = format!("{}/objects", args.url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout))
        .build()?;

    let response = client.get(&url).send().await?.error_for_status()?;
    let objects: Vec<ObjectRow> = response.json().await?;

    match OutputFormat::from_json_flag(args.json) {
        OutputFormat::Human => {
            if objects.is_empty() {
                println!("No objects");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = objects
                .iter()
                .map(|o| {
                    vec![
                        o.name.clone(),
                        o.subscribers.to_string(),
                        o.created_at.clone(),
                    ]
                })
                .collect();
            print_table(&["NAME", "SUBSCRIBERS", "CREATED"], &rows);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&objects)?);
        }
    }

    Ok(())
}
