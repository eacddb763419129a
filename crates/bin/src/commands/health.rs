//! Health check command - checks a running sharedstate server.

use std::time::Duration;

use serde::Deserialize;

use crate::cli::HealthArgs;

#[derive(Debug, Deserialize)]
struct HealthReport {
    status: String,
    #[serde(default)]
    objects: usize,
    #[serde(default)]
    connections: usize,
}

/// Fetch the server's health report, describing any failure.
async fn check(url: &str, timeout: Duration) -> Result<HealthReport, String> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| format!("failed to build HTTP client: {e}"))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("failed to connect to {url}: {e}"))?;
    if !response.status().is_success() {
        return Err(format!("server returned HTTP status {}", response.status()));
    }

    response
        .json()
        .await
        .map_err(|e| format!("unreadable health response: {e}"))
}

/// Run the health check command
pub async fn run(args: &HealthArgs) -> Result<(), Box<dyn std::error::Error>> {
    let base = args.url.trim_end_matches('/');
    let url = if base.ends_with("/health") {
        base.to_string()
    } else {
        format!("{base}/health")
    };

    match check(&url, Duration::from_secs(args.timeout)).await {
        Ok(report) if report.status == "healthy" => {
            println!(
                "healthy: {} objects, {} connections",
                report.objects, report.connections
            );
            Ok(())
        }
        Ok(report) => {
            eprintln!("unhealthy: server returned status {}", report.status);
            std::process::exit(1);
        }
        Err(reason) => {
            eprintln!("unhealthy: {reason}");
            std::process::exit(1);
        }
    }
}
