use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Management CLI for abuse-guard", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "ABUSE_GUARD_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check guard status
    Status,
    /// Show blocked keys and tracker totals
    Stats,
    /// List live blocks with expiry
    Blocks,
    /// Show whether a key is blocked
    Check { key: String },
    /// Block a key immediately
    Block { key: String },
    /// Lift a block and reset the key's failure history
    Unblock { key: String },
}

impl Commands {
    fn route(&self) -> (Method, String) {
        match self {
            Commands::Status => (Method::GET, "/admin/status".to_string()),
            Commands::Stats => (Method::GET, "/admin/abuse/stats".to_string()),
            Commands::Blocks => (Method::GET, "/admin/abuse/blocks".to_string()),
            Commands::Check { key } => (Method::GET, format!("/admin/abuse/blocks/{}", key)),
            Commands::Block { key } => (Method::POST, format!("/admin/abuse/blocks/{}", key)),
            Commands::Unblock { key } => (Method::DELETE, format!("/admin/abuse/blocks/{}", key)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (method, path) = cli.command.route();
    let res = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
