use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use blogdeck::app::{App, AppEvent, AppServices};
use blogdeck::config::Config;
use blogdeck::content::{build_client, HttpSummaryProvider, SummaryLookup, SummaryProvider};
use blogdeck::deck::Deck;
use blogdeck::gesture::SwipeDirection;
use blogdeck::storage::{Database, DatabaseError};
use blogdeck::sync::{CloudSync, HttpRemoteTable, StaticIdentity};
use blogdeck::util::SystemClock;

/// Get the config directory path (~/.config/blogdeck/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("blogdeck"))
}

#[derive(Parser, Debug)]
#[command(name = "blogdeck", about = "Swipe-to-triage blog reader")]
struct Args {
    /// Reset database (delete and recreate)
    #[arg(long)]
    reset_db: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add the posts of an RSS/Atom file to the inbox
    Ingest {
        file: PathBuf,
        /// Blog name shown on each post (defaults to the feed title)
        #[arg(long, default_value = "")]
        blog: String,
    },
    /// List a deck and show badge counts
    Deck { name: Deck },
    /// Swipe the current card of a swipe deck
    Swipe {
        direction: SwipeDirection,
        #[arg(long, default_value = "inbox")]
        deck: Deck,
    },
    /// Mark a post as favorite
    Favorite { link: String },
    /// Print the readable article
    Read { link: String },
    /// Print the AI summary
    Summary { link: String },
    /// Manage highlights
    Highlight {
        #[command(subcommand)]
        action: HighlightAction,
    },
    /// Merge highlights and statuses from the cloud store
    Sync,
    /// Open the original article in the browser
    Open { link: String },
}

#[derive(Subcommand, Debug)]
enum HighlightAction {
    Add {
        link: String,
        position: u64,
        text: String,
    },
    Remove {
        link: String,
        position: u64,
    },
    /// List highlights for one article, or every highlighted article
    List { link: Option<String> },
}

fn build_services(config: &Config) -> Result<AppServices> {
    let client = build_client();
    let summaries: Arc<dyn SummaryProvider> = Arc::new(
        HttpSummaryProvider::new(client.clone(), &config.api_base_url, config.interests.clone())
            .context("Invalid api_base_url")?,
    );

    let sync = match (&config.cloud_url, config.cloud_api_key(), &config.user_id) {
        (Some(url), Some(key), Some(user_id)) => {
            let remote = HttpRemoteTable::new(client.clone(), url, key, config.cloud_access_token())
                .context("Invalid cloud_url")?;
            CloudSync::new(Arc::new(StaticIdentity::new(user_id)), Arc::new(remote))
        }
        (Some(_), _, _) => {
            tracing::warn!("cloud_url is set but cloud_api_key or user_id is missing, cloud sync disabled");
            CloudSync::disabled()
        }
        _ => CloudSync::disabled(),
    };

    Ok(AppServices {
        client,
        summaries,
        sync,
        clock: Arc::new(SystemClock),
    })
}

fn print_summary(lookup: &SummaryLookup) {
    match lookup.record() {
        Some(record) => {
            println!("TL;DR: {}", record.tldr);
            for point in &record.key_points {
                println!("  - {point}");
            }
            if let Some(rec) = &record.recommendation {
                println!("Recommendation: {:?} ({})", rec.score, rec.reason);
            }
            if let Some(minutes) = record.reading_time {
                println!("Reading time: {minutes} min");
            }
        }
        None => println!("Summary unavailable"),
    }
}

/// Feed events to the app until the committed card has left.
async fn wait_for_exit(app: &mut App, rx: &mut mpsc::Receiver<AppEvent>) {
    let deadline = app.gesture.config().exit_animation + Duration::from_secs(1);
    let _ = tokio::time::timeout(deadline, async {
        while let Some(event) = rx.recv().await {
            let done = matches!(event, AppEvent::CardExitFinished { .. });
            app.handle_event(event);
            if done {
                break;
            }
        }
    })
    .await;
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    // User-only access to the config directory
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(path = %config_dir.display(), error = %e, "Failed to set config directory permissions to 0700");
        }
    }

    let config = Config::load(&config_dir.join("config.toml")).context("Failed to load config")?;

    let db_path = config_dir.join("blogdeck.db");
    if args.reset_db && db_path.exists() {
        std::fs::remove_file(&db_path).context("Failed to delete database")?;
        println!("Database reset.");
    }
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db.with_storage_quota(config.storage_quota_bytes),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: Another instance of blogdeck appears to be running. Please close it and try again.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let services = build_services(&config)?;
    let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(32);
    let mut app = App::load(db, config, services, event_tx)
        .await
        .context("Failed to create application")?;

    match args.command {
        Command::Ingest { file, blog } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read feed file: {}", file.display()))?;
            let inserted = app.ingest_feed(&bytes, &blog).await?;
            println!("Added {inserted} new posts");
        }
        Command::Deck { name } => {
            app.switch_deck(name);
            let counts = app.counts();
            for deck in Deck::ALL {
                let marker = if deck == name { "*" } else { " " };
                println!("{marker} {:<10} {}", deck.name(), counts.get(deck));
            }
            println!();
            for post in app.deck.visible() {
                println!("[{}] {} ({})\n    {}", post.status, post.title, post.blog_name, post.link);
            }
        }
        Command::Swipe { direction, deck } => {
            let Some(card) = app.switch_deck(deck) else {
                println!("Deck '{deck}' is empty");
                return Ok(());
            };
            let link = card.link.clone();
            match app.swipe(direction).await {
                Some(t) => println!("{}: {} -> {}", t.link, t.from, t.to),
                None => println!("{link}: no change"),
            }
            wait_for_exit(&mut app, &mut event_rx).await;
            match app.card.as_ref() {
                Some(next) => println!("Next: {}", next.link),
                None => println!("Deck '{deck}' is now empty"),
            }
        }
        Command::Favorite { link } => match app.favorite(&link).await {
            Some(t) => println!("{}: {} -> {}", t.link, t.from, t.to),
            None => println!("{link}: no change"),
        },
        Command::Read { link } => {
            let (article, summary) =
                tokio::join!(app.articles.fetch(&link), app.summaries.get_summary(&link));
            match article {
                Ok(article) => {
                    println!("{}", article.title);
                    if let Some(byline) = &article.byline {
                        println!("by {byline}");
                    }
                    println!();
                    println!("{}", article.content);
                }
                Err(e) => {
                    println!("Could not load article: {e}");
                    println!("Open the original: {link}");
                }
            }
            println!();
            print_summary(&summary);
        }
        Command::Summary { link } => {
            print_summary(&app.summaries.get_summary(&link).await);
        }
        Command::Highlight { action } => match action {
            HighlightAction::Add {
                link,
                position,
                text,
            } => {
                app.add_highlight(&link, &text, position).await?;
                println!("Highlighted at {position}");
            }
            HighlightAction::Remove { link, position } => {
                match app.remove_highlight(&link, position).await? {
                    Some(h) => println!("Removed \"{}\"", h.text),
                    None => println!("No highlight at {position}"),
                }
            }
            HighlightAction::List { link: Some(link) } => {
                for h in app.highlights.for_article(&link) {
                    println!("{:>6}  {}", h.position, h.text);
                }
            }
            HighlightAction::List { link: None } => {
                let mut urls: Vec<_> = app.highlights.highlighted_articles().into_iter().collect();
                urls.sort();
                for url in urls {
                    println!("{:>3}  {url}", app.highlights.for_article(&url).len());
                }
            }
        },
        Command::Sync => {
            let report = app.pull_from_cloud().await.context("Cloud sync failed")?;
            println!(
                "Highlights: {} added, {} replaced. Statuses applied: {}",
                report.highlights.added, report.highlights.replaced, report.statuses_applied
            );
        }
        Command::Open { link } => app.open_original(&link)?,
    }

    app.sync.flush().await;
    Ok(())
}
