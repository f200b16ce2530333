use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    load_settings, prices::HISTORY_ROW_LIMIT, ClientEvent, EnergyClient, StartOutcome,
};
use shared::domain::{Preset, TrainingStatus};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Terminal client for the home energy advisor backend")]
struct Args {
    /// Overrides the configured API base URL.
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show stored preferences and the comfort score.
    Prefs,
    /// Flip avoid hours and recompute comfort.
    Toggle {
        #[arg(required = true)]
        hours: Vec<u8>,
    },
    /// Replace the avoid hours with a preset.
    Preset { preset: PresetArg },
    /// Persist avoid hours and priority appliances.
    Save {
        #[arg(long = "priority")]
        priority_appliances: Vec<String>,
    },
    /// Train the scheduling agent and wait for it to finish.
    Train,
    /// Interactive chat with the energy advisor.
    Chat,
    /// Live prices, or recent history with --history.
    Prices {
        #[arg(long)]
        history: bool,
    },
    /// Store appliances (NAME=HOURS) and show the cost analysis.
    Appliances {
        #[arg(long = "add", value_parser = parse_appliance)]
        add: Vec<(String, f64)>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PresetArg {
    NightSleeper,
    EarlyBird,
    NightOwl,
    NineToFive,
}

impl From<PresetArg> for Preset {
    fn from(value: PresetArg) -> Self {
        match value {
            PresetArg::NightSleeper => Preset::NightSleeper,
            PresetArg::EarlyBird => Preset::EarlyBird,
            PresetArg::NightOwl => Preset::NightOwl,
            PresetArg::NineToFive => Preset::NineToFive,
        }
    }
}

fn parse_appliance(raw: &str) -> Result<(String, f64), String> {
    let (name, hours) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=HOURS, got '{raw}'"))?;
    let hours = hours
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("invalid duration in '{raw}': {err}"))?;
    Ok((name.trim().to_string(), hours))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(api_url) = args.api_url {
        settings.api_base_url = api_url;
    }
    info!(api_base_url = %settings.api_base_url, "starting energy client");

    let client = EnergyClient::connect(&settings)?;
    client.session().begin().await;
    let outcome = run(&client, args.command).await;
    client.shutdown().await;
    outcome
}

async fn run(client: &EnergyClient, command: Command) -> Result<()> {
    match command {
        Command::Prefs => {
            client.comfort().load().await?;
            print_comfort(client).await;
        }
        Command::Toggle { hours } => {
            client.comfort().load().await?;
            for hour in hours {
                client.comfort().toggle_avoid_hour(hour).await?;
            }
            wait_for_comfort(client).await?;
            print_comfort(client).await;
        }
        Command::Preset { preset } => {
            let preset = Preset::from(preset);
            client.comfort().load().await?;
            client.comfort().apply_preset(preset.hours().to_vec()).await?;
            println!("Applied preset: {}", preset.label());
            wait_for_comfort(client).await?;
            print_comfort(client).await;
        }
        Command::Save {
            priority_appliances,
        } => {
            client.comfort().load().await?;
            if !priority_appliances.is_empty() {
                client
                    .comfort()
                    .set_priority_appliances(priority_appliances)
                    .await;
            }
            client.comfort().save().await?;
            println!("Preferences saved.");
            print_comfort(client).await;
        }
        Command::Train => train(client).await?,
        Command::Chat => chat(client).await?,
        Command::Prices { history } => prices(client, history).await?,
        Command::Appliances { add } => appliances(client, add).await?,
    }
    Ok(())
}

async fn print_comfort(client: &EnergyClient) {
    let snapshot = client.comfort().snapshot().await;
    let hours: Vec<String> = snapshot
        .preferences
        .avoid_hours
        .iter()
        .map(|hour| format!("{hour:02}:00"))
        .collect();
    println!(
        "Avoid hours: {}",
        if hours.is_empty() {
            "none".to_string()
        } else {
            hours.join(", ")
        }
    );
    if !snapshot.preferences.priority_appliances.is_empty() {
        println!(
            "Priority appliances: {}",
            snapshot.preferences.priority_appliances.join(", ")
        );
    }
    println!("Comfort level: {:.1}/10", snapshot.preferences.comfort_level);
    if let Some(advice) = snapshot.advice {
        println!("{advice}");
    }
    if let Some(notice) = snapshot.notice {
        println!("Warning: {}", notice.message);
    }
}

/// Waits until the debounced recompute has fired and answered.
async fn wait_for_comfort(client: &EnergyClient) -> Result<()> {
    let settings = client.settings();
    let deadline = settings.comfort_debounce() + settings.request_timeout() + Duration::from_secs(1);
    tokio::time::timeout(deadline, async {
        loop {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let pending = client.comfort().has_pending_recompute().await;
            if !pending && !client.comfort().snapshot().await.calculating {
                return;
            }
        }
    })
    .await
    .context("comfort recompute did not finish")
}

async fn train(client: &EnergyClient) -> Result<()> {
    let mut events = client.subscribe_events();
    client.comfort().load().await?;
    match client.train_with_current_preferences().await? {
        StartOutcome::Started => {}
        StartOutcome::AlreadyActive => bail!("a training job is already running"),
        StartOutcome::Cancelled => bail!("training start was cancelled"),
    }
    println!("Training started.");

    loop {
        match events.recv().await {
            Ok(ClientEvent::TrainingChanged(snapshot)) => match snapshot.status {
                TrainingStatus::Running => {
                    if let Some(progress) = snapshot.progress {
                        println!("{progress}");
                    }
                }
                TrainingStatus::Completed => {
                    println!("{}", snapshot.result_advice.unwrap_or_default());
                    return Ok(());
                }
                TrainingStatus::Failed => {
                    let reason = snapshot
                        .failure
                        .map(|err| err.message)
                        .unwrap_or_else(|| "unknown error".into());
                    return Err(anyhow!("training failed: {reason}"));
                }
                TrainingStatus::Idle | TrainingStatus::Starting => {}
            },
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                info!(skipped, "training progress events skipped");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                bail!("client event channel closed")
            }
        }
    }
}

async fn chat(client: &EnergyClient) -> Result<()> {
    for message in client.conversation().transcript().await {
        println!("advisor> {}", message.text);
        print_suggestions(&message.suggestions);
    }
    println!("(type /reset to start over, /quit or Ctrl-D to leave)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/reset" => {
                client.conversation().reset().await;
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }
        if client.conversation().append_user_message(&line).await.is_none() {
            continue;
        }
        let outcome = client.conversation().send_pending().await?;
        println!("advisor> {}", outcome.reply.text);
        print_suggestions(&outcome.reply.suggestions);
    }
    Ok(())
}

fn print_suggestions(suggestions: &[String]) {
    for suggestion in suggestions {
        println!("  - {suggestion}");
    }
}

async fn prices(client: &EnergyClient, history: bool) -> Result<()> {
    if history {
        let snapshot = client.prices().refresh_history().await?;
        let rows = snapshot.history_rows(HISTORY_ROW_LIMIT);
        if rows.is_empty() {
            println!("No price history available yet.");
        }
        for row in rows {
            println!(
                "{:<20} {:>8.4} {:>5.0}% {:?}",
                row.label, row.value, row.relative, row.band
            );
        }
        return Ok(());
    }

    let snapshot = client.prices().refresh_live().await?;
    let Some(summary) = snapshot.live_summary() else {
        println!("No live prices available.");
        return Ok(());
    };
    println!("Current: {:.4} ({:?})", summary.current, summary.trend);
    println!(
        "Min {:.4} / Avg {:.4} / Max {:.4}",
        summary.stats.min, summary.stats.avg, summary.stats.max
    );
    for sample in snapshot.live.samples() {
        println!("{:<8} {:.4}", sample.label, sample.value);
    }
    Ok(())
}

async fn appliances(client: &EnergyClient, add: Vec<(String, f64)>) -> Result<()> {
    if !add.is_empty() {
        // Saving replaces the stored list, so start from what is stored.
        client.appliances().load().await?;
        for (name, hours) in &add {
            client.appliances().add(name, *hours).await?;
        }
        let saved = client.appliances().save().await?;
        println!("Saved {saved} appliance(s).");
    }

    let analysis = client.appliances().analyze().await?;
    let summary = &analysis.summary;
    println!("Total power:   {:.2} kW", summary.total_power_kw);
    println!("Daily usage:   {:.2} kWh", summary.estimated_daily_usage_kwh);
    println!("Daily cost:    {:.2}", summary.estimated_daily_cost);
    println!("Average price: {:.4}/kWh", summary.average_price_per_kwh);
    for item in &analysis.appliance_breakdown {
        println!(
            "  {:<16} {:>5.2} kW  {:>4.1} h  from {:<6} cost {:.2}",
            item.name, item.power, item.duration, item.start_time, item.estimated_cost
        );
    }
    Ok(())
}
