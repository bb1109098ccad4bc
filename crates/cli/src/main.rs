use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use occacia_agents::{FlowConfig, LangflowClient, PlanningAgent, MIN_FLOW_TIMEOUT};
use occacia_core::{PlanRequest, PlanResponse};
use occacia_observability::{init_tracing, AppMetrics};
use occacia_storage::{seed_demo_catalog, Store};

#[derive(Debug, Parser)]
#[command(name = "occacia")]
#[command(about = "Occacia event planning CLI")]
struct Cli {
    /// SQLite url; the seeded in-memory catalog is used when absent.
    #[arg(long, env = "OCCACIA_DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "LANGFLOW_URL", default_value = "")]
    langflow_url: String,

    #[arg(long, env = "LANGFLOW_TOKEN", default_value = "", hide_env_values = true)]
    langflow_token: String,

    #[arg(long, env = "LANGFLOW_ORG_ID", default_value = "")]
    langflow_org_id: String,

    #[arg(long, env = "LANGFLOW_TIMEOUT_SECONDS", default_value_t = MIN_FLOW_TIMEOUT.as_secs())]
    langflow_timeout_seconds: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a single planning turn and print the JSON response.
    Plan {
        query: String,
        #[arg(long)]
        session: Option<String>,
    },
    /// Interactive planning conversation.
    Chat,
    Packages {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Insert the demo catalog if the store is empty.
    Seed,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("occacia_cli");
    let cli = Cli::parse();

    let store = open_store(cli.database_url.as_deref()).await?;

    let flow = LangflowClient::new(FlowConfig {
        url: cli.langflow_url,
        token: cli.langflow_token,
        org_id: cli.langflow_org_id,
        timeout: Duration::from_secs(cli.langflow_timeout_seconds),
    })?;
    let agent = PlanningAgent::new(Arc::new(store), flow, AppMetrics::shared());

    match cli.command {
        Command::Plan { query, session } => {
            let response = agent
                .generate_plan(PlanRequest {
                    user_query: query,
                    session_id: session,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Chat => run_chat(&agent).await?,
        Command::Packages { limit } => {
            let packages = agent.list_packages(limit.clamp(1, 100)).await?;
            println!("{}", serde_json::to_string_pretty(&packages)?);
        }
        Command::Seed => {
            let store = agent.store();
            match seed_demo_catalog(store).await? {
                0 => println!("{} catalog already populated", store.backend_name()),
                inserted => println!(
                    "seeded {inserted} packages into the {} store",
                    store.backend_name()
                ),
            }
        }
    }

    Ok(())
}

async fn open_store(database_url: Option<&str>) -> Result<Store> {
    match database_url.map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => Store::sqlite(url)
            .await
            .with_context(|| format!("failed to open database {url}")),
        None => {
            let store = Store::memory();
            seed_demo_catalog(&store).await?;
            Ok(store)
        }
    }
}

async fn run_chat(agent: &PlanningAgent<Store, LangflowClient>) -> Result<()> {
    let mut session_id: Option<String> = None;

    println!("Occacia planner. Describe your event, or type 'exit' to quit.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }
        if message.is_empty() {
            continue;
        }

        let response = agent
            .generate_plan(PlanRequest {
                user_query: message.to_string(),
                session_id: session_id.clone(),
            })
            .await?;
        session_id = Some(response.session_id.clone());

        print!("{}", render_turn(&response));
    }

    Ok(())
}

fn render_turn(response: &PlanResponse) -> String {
    let mut out = String::new();
    let reply = response
        .chat_response
        .as_deref()
        .unwrap_or(response.reasoning.as_str());
    out.push_str(&format!("\n{reply}\n\n"));

    if !response.matched_venues.is_empty() {
        out.push_str("Matched venues:\n");
        for venue in &response.matched_venues {
            out.push_str(&format!(
                "- {} ({}, {:.0} LKR per head)\n",
                venue.name,
                venue.location.as_deref().unwrap_or("island-wide"),
                venue.price_per_head
            ));
        }
        out.push('\n');
    }

    if !response.missing_info.is_empty() {
        out.push_str(&format!(
            "Still need: {}\n\n",
            response.missing_info.join(", ")
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use occacia_core::{AiAnalysis, Intent, Package};

    #[test]
    fn turn_lists_reply_venues_and_missing_info() {
        let analysis = AiAnalysis {
            intent: Intent::Planning,
            reasoning: Some("Quiet dinner in Kandy".to_string()),
            missing_info: vec!["date".to_string()],
            ..AiAnalysis::default()
        };
        let package = Package {
            id: 1,
            vendor_id: 1,
            name: "The Hermit's Dinner".to_string(),
            description: None,
            price: 3_500.0,
            price_per_head: None,
            min_guests: 1,
            max_guests: 4,
            tags: vec!["quiet".to_string()],
            location_coverage: Some("Kandy".to_string()),
        };
        let response = PlanResponse::assemble(String::new(), analysis, &[package]);

        let text = render_turn(&response);
        assert!(text.contains("Quiet dinner in Kandy"));
        assert!(text.contains("- The Hermit's Dinner (Kandy, 3500 LKR per head)"));
        assert!(text.contains("Still need: date"));
    }

    #[test]
    fn chat_reply_wins_over_reasoning() {
        let response = PlanResponse::assemble(
            "s-1".to_string(),
            AiAnalysis::service_fallback(),
            &[],
        );
        let text = render_turn(&response);
        assert!(text.contains(response.chat_response.as_deref().unwrap()));
        assert!(!text.contains("Matched venues"));
    }
}
