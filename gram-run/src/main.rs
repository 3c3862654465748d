//! gram-run - Publish Instagram carousels and reels from rotating content

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use libgramcast::logging::{LogFormat, LoggingConfig};
use libgramcast::service::publishing::{success_message, RunKind};
use libgramcast::service::AccountStatus;
use libgramcast::{
    Account, Config, ContentType, GramcastError, GramcastService, ImageNaming, PublishOutcome,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gram-run")]
#[command(version, about = "Publish Instagram carousels and reels from rotating content")]
#[command(long_about = r#"Publish Instagram carousels and reels from rotating content.

Each account rotates through a caption list, a numbered image library
(carousels) or a pool of 200 videos (reels). Rotation state is kept next to
the account registry so consecutive runs never repeat content.

EXAMPLES:
    # Publish the next post for every account
    gram-run run

    # Publish for accounts 0 and 2 only
    gram-run run --account 0 --account 2

    # See what account 1 would publish next, then pick images by hand
    gram-run preview 1
    gram-run publish-carousel 1 --image "https://cdn.example/img%20%284%29.jpg" --caption "Hello"

    # Status of every account as JSON
    gram-run status --format json

EXIT CODES:
    0 - Success
    1 - A run or remote call failed
    2 - Configuration or credential error
    3 - Invalid input (unknown account, empty selection)
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format on stderr (text, json, pretty)
    #[arg(long, global = true, env = "GRAMCAST_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish the next rotation for accounts (all of them by default)
    Run {
        /// Account index to run (repeatable)
        #[arg(long = "account", value_name = "N")]
        accounts: Vec<usize>,

        /// Output format
        #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Show the next caption and candidate images or videos without changing anything
    Preview {
        /// Account index
        index: usize,

        /// Image count to preview (default: slides per post); three extra are listed
        #[arg(long)]
        count: Option<usize>,

        /// Number of video candidates
        #[arg(long, default_value = "8")]
        videos: usize,
    },

    /// Publish selected images as a carousel
    PublishCarousel {
        /// Account index
        index: usize,

        /// Image URL, in carousel order (repeatable)
        #[arg(long = "image", value_name = "URL")]
        images: Vec<String>,

        /// Caption to use instead of the next rotating caption
        #[arg(long)]
        caption: Option<String>,
    },

    /// Publish a selected video as a reel
    PublishReel {
        /// Account index
        index: usize,

        /// Video URL
        #[arg(long, value_name = "URL")]
        video: String,

        /// Caption to use instead of the next rotating caption
        #[arg(long)]
        caption: Option<String>,
    },

    /// Show the last run status of every account
    Status {
        /// Output format
        #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Manage the account registry
    Accounts {
        #[command(subcommand)]
        command: AccountsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum AccountsCommand {
    /// List configured accounts
    List {
        /// Output format
        #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Append a new account
    Add(AccountFields),

    /// Change fields of an existing account
    Edit {
        /// Account index
        index: usize,

        #[command(flatten)]
        fields: AccountFields,
    },
}

#[derive(Args, Debug, Default)]
struct AccountFields {
    /// Display name
    #[arg(long)]
    name: Option<String>,

    /// Content type (carousel or reel)
    #[arg(long = "type", value_name = "TYPE")]
    content_type: Option<ContentType>,

    /// Environment variable holding the access token
    #[arg(long, value_name = "VAR")]
    access_token_env: Option<String>,

    /// Environment variable holding the Instagram user id
    #[arg(long, value_name = "VAR")]
    ig_user_id_env: Option<String>,

    /// URL of the caption list (one caption per line)
    #[arg(long, value_name = "URL")]
    caption_url: Option<String>,

    /// Key for rotation state files; must be unique per account
    #[arg(long, value_name = "PREFIX")]
    state_prefix: Option<String>,

    /// Image library base URL (carousel)
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Images per carousel (carousel)
    #[arg(long, value_name = "N")]
    slides_per_post: Option<u32>,

    /// Image filename scheme: img or ram (carousel)
    #[arg(long, value_name = "SCHEME")]
    image_naming: Option<ImageNaming>,

    /// Video library base URL (reel)
    #[arg(long, value_name = "URL")]
    video_base_url: Option<String>,
}

impl AccountFields {
    /// Overlay the given flags on `account`
    fn apply(self, mut account: Account) -> Account {
        if let Some(name) = self.name {
            account.name = name;
        }
        if let Some(content_type) = self.content_type {
            account.content_type = content_type;
        }
        if let Some(var) = self.access_token_env {
            account.access_token_env = var;
        }
        if let Some(var) = self.ig_user_id_env {
            account.ig_user_id_env = var;
        }
        if let Some(url) = self.caption_url {
            account.caption_url = url;
        }
        if let Some(prefix) = self.state_prefix {
            account.state_prefix = prefix;
        }
        if self.base_url.is_some() {
            account.base_url = self.base_url;
        }
        if self.slides_per_post.is_some() {
            account.slides_per_post = self.slides_per_post;
        }
        if self.image_naming.is_some() {
            account.image_naming = self.image_naming;
        }
        if self.video_base_url.is_some() {
            account.video_base_url = self.video_base_url;
        }
        account
    }

    fn into_new_account(self) -> Result<Account> {
        let content_type = self.content_type.ok_or_else(|| {
            GramcastError::InvalidInput("--type is required (carousel or reel)".to_string())
        })?;
        let mut blank = match content_type {
            ContentType::Carousel => Account::carousel("", "", "", 1),
            ContentType::Reel => Account::reel("", "", ""),
        };
        // Saving fills in one slide when none is given
        blank.slides_per_post = None;
        Ok(self.apply(blank))
    }
}

#[tokio::main]
async fn main() {
    // Credentials usually live in a .env file next to the registry
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let level = std::env::var("GRAMCAST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    LoggingConfig::new(cli.log_format, level, cli.verbose).init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(exit_code(&e));
        }
    }
}

fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<GramcastError>()
        .map(GramcastError::exit_code)
        .unwrap_or(1)
}

async fn run(cli: Cli) -> Result<i32> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load()?,
    };
    let service = GramcastService::from_config(&config);
    tracing::debug!(
        accounts = %service.accounts().path().display(),
        state_dir = %config.state_dir().display(),
        "Loaded configuration"
    );

    match cli.command {
        Commands::Run { accounts, format } => run_accounts(&service, &accounts, &format).await,
        Commands::Preview {
            index,
            count,
            videos,
        } => {
            let account = service.account(index)?;
            let preview = service
                .previews()
                .preview_with(&account, count, videos)
                .await?;
            println!("{}", serde_json::to_string_pretty(&preview)?);
            Ok(0)
        }
        Commands::PublishCarousel {
            index,
            images,
            caption,
        } => {
            let account = service.account(index)?;
            let outcome = service
                .publish_selected_carousel(&account, &images, caption.as_deref())
                .await?;
            print_outcome(&account, RunKind::ManualCarousel, &outcome);
            Ok(0)
        }
        Commands::PublishReel {
            index,
            video,
            caption,
        } => {
            let account = service.account(index)?;
            let outcome = service
                .publish_selected_reel(&account, &video, caption.as_deref())
                .await?;
            print_outcome(&account, RunKind::ManualReel, &outcome);
            Ok(0)
        }
        Commands::Status { format } => {
            let statuses = service.all_statuses()?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else {
                print_statuses(&statuses);
            }
            Ok(0)
        }
        Commands::Accounts { command } => manage_accounts(&service, command),
    }
}

async fn run_accounts(service: &GramcastService, indices: &[usize], format: &str) -> Result<i32> {
    let accounts = if indices.is_empty() {
        service.accounts().load()?
    } else {
        indices
            .iter()
            .map(|&index| service.account(index))
            .collect::<libgramcast::Result<Vec<_>>>()?
    };

    if accounts.is_empty() {
        eprintln!("No accounts configured in {}", service.accounts().path().display());
        return Ok(0);
    }

    let results = service.run_accounts(accounts).await;
    let failures = results.iter().filter(|(_, r)| r.is_err()).count();

    if format == "json" {
        let report: Vec<serde_json::Value> = results
            .iter()
            .map(|(account, result)| match result {
                Ok(outcome) => serde_json::json!({
                    "account": account.name,
                    "state_prefix": account.state_prefix,
                    "ok": true,
                    "result": outcome,
                }),
                Err(e) => serde_json::json!({
                    "account": account.name,
                    "state_prefix": account.state_prefix,
                    "ok": false,
                    "error": e.to_string(),
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (account, result) in &results {
            match result {
                Ok(outcome) => {
                    let kind = match account.content_type {
                        ContentType::Carousel => RunKind::Carousel,
                        ContentType::Reel => RunKind::Reel,
                    };
                    print_outcome(account, kind, outcome);
                }
                Err(e) => println!("{} error: {}", account.display_name(), e),
            }
        }
    }

    Ok(if failures > 0 { 1 } else { 0 })
}

fn print_outcome(account: &Account, kind: RunKind, outcome: &PublishOutcome) {
    println!("{}: {}", account.display_name(), success_message(kind, outcome));
}

fn print_statuses(statuses: &[AccountStatus]) {
    if statuses.is_empty() {
        println!("No accounts configured");
        return;
    }

    for entry in statuses {
        let last_run = entry
            .status
            .last_run
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "[{}] {} ({}, {}): {} (last run: {})",
            entry.index, entry.name, entry.content_type, entry.state_prefix, entry.status.status, last_run
        );
        for line in entry.status.message.lines() {
            println!("    {}", line);
        }
    }
}

fn manage_accounts(service: &GramcastService, command: AccountsCommand) -> Result<i32> {
    let store = service.accounts();
    match command {
        AccountsCommand::List { format } => {
            let accounts = store.load()?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&accounts)?);
            } else if accounts.is_empty() {
                println!("No accounts configured");
            } else {
                for (index, account) in accounts.iter().enumerate() {
                    let source = match account.content_type {
                        ContentType::Carousel => format!(
                            "{} x{} ({:?} naming)",
                            account.base_url.as_deref().unwrap_or("-"),
                            account.slides_per_post(),
                            account.naming()
                        ),
                        ContentType::Reel => account
                            .video_base_url
                            .as_deref()
                            .unwrap_or("-")
                            .to_string(),
                    };
                    println!(
                        "[{}] {} ({}) state={} {}",
                        index, account.name, account.content_type, account.state_prefix, source
                    );
                }
            }
            Ok(0)
        }
        AccountsCommand::Add(fields) => {
            let account = fields.into_new_account()?;
            let index = store.upsert(None, account)?;
            println!("Added account {}", index);
            Ok(0)
        }
        AccountsCommand::Edit { index, fields } => {
            let account = fields.apply(store.get(index)?);
            store.upsert(Some(index), account)?;
            println!("Updated account {}", index);
            Ok(0)
        }
    }
}
