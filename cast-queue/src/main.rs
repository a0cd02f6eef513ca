//! cast-queue - Manage queued posts
//!
//! Authoring front end for the Castboard queue: create, edit, cancel,
//! reschedule and delete posts, and manage which targets an owner publishes to.

use clap::{Parser, Subcommand};
use libcastboard::logging::{LogFormat, LoggingConfig};
use libcastboard::scheduling::{format_timestamp, parse_schedule};
use libcastboard::service::queue::{NewPost, PostUpdate};
use libcastboard::service::CastboardService;
use libcastboard::{ActivityLog, CastboardError, Config, Post, PostStatus, Result};

#[derive(Parser, Debug)]
#[command(name = "cast-queue")]
#[command(version)]
#[command(about = "Manage queued posts")]
#[command(long_about = "\
cast-queue - Manage queued posts

DESCRIPTION:
    cast-queue manages the Castboard publishing queue. Posts created here are
    picked up by cast-send once their scheduled time has passed.

COMMANDS:
    create      Queue a new post
    list        List posts
    show        Show one post with its per-target status
    update      Edit a post that has not been published
    submit      Schedule a draft
    cancel      Move a scheduled post back to draft
    reschedule  Schedule a post (again) at a new time
    delete      Delete a post
    targets     List, enable or disable publishing targets
    activity    Show the activity log

USAGE EXAMPLES:
    # Queue a post for two targets
    cast-queue create --title Launch --content \"We are live\" \\
        --target twitter --target linkedin --at \"tomorrow 9am\"

    # Enable a target for the current owner
    cast-queue targets enable twitter

    # Schedule a draft for tonight
    cast-queue submit <POST_ID> --at \"today 8pm\"

    # List failed posts as JSON
    cast-queue list --status failed --format json

    # Retry a failed post in 10 minutes
    cast-queue reschedule <POST_ID> +10m

CONFIGURATION:
    Configuration file: ~/.config/castboard/config.toml

    Override with environment variables:
        CASTBOARD_CONFIG    - Path to config file
        CASTBOARD_DB_PATH   - Path to database file
        CASTBOARD_OWNER     - Owner posts are created for

RULES:
    A post needs at least one target enabled for the owner, its content must
    fit the smallest limit among its targets, and an owner can have at most
    10 scheduled posts per (UTC) day.

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Database or configuration error
    3 - Invalid input (bad post ID, time format, status transition, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Owner whose posts and targets are managed
    #[arg(long, global = true, env = "CASTBOARD_OWNER", default_value = "default")]
    owner: String,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Queue a new post
    Create {
        #[arg(long)]
        title: String,

        #[arg(long)]
        content: String,

        /// Target id (repeatable)
        #[arg(short, long = "target", value_name = "TARGET")]
        targets: Vec<String>,

        /// Schedule time (e.g. "+2h", "tomorrow 9am", "2026-11-20T15:00:00Z")
        #[arg(long, value_name = "TIME")]
        at: Option<String>,

        /// Image reference attached to the post
        #[arg(long)]
        image: Option<String>,

        /// Store as draft instead of scheduling
        #[arg(long)]
        draft: bool,
    },

    /// List posts
    List {
        /// Filter by status: draft, scheduled, published, failed
        #[arg(short, long)]
        status: Option<String>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show one post
    Show {
        post_id: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Edit a post
    Update {
        post_id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        content: Option<String>,

        #[arg(long)]
        image: Option<String>,

        /// New schedule time
        #[arg(long, value_name = "TIME")]
        at: Option<String>,

        /// Replace the target set (repeatable)
        #[arg(short, long = "target", value_name = "TARGET")]
        targets: Vec<String>,
    },

    /// Schedule a draft
    Submit {
        post_id: String,

        /// Schedule time; defaults to the draft's stored time
        #[arg(long, value_name = "TIME")]
        at: Option<String>,
    },

    /// Cancel a scheduled post (moves it back to draft)
    Cancel { post_id: String },

    /// Reschedule a post
    Reschedule {
        post_id: String,

        /// New schedule time (e.g. "tomorrow 3pm", "+2h")
        time: String,
    },

    /// Delete a post
    Delete { post_id: String },

    /// Manage publishing targets
    Targets {
        #[command(subcommand)]
        action: TargetAction,
    },

    /// Show the owner's activity log, newest first
    Activity {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand, Debug)]
enum TargetAction {
    /// List targets and whether the owner has them enabled
    List,
    /// Enable a target for the owner
    Enable { target_id: String },
    /// Disable a target for the owner
    Disable { target_id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "error" };
    LoggingConfig::new(LogFormat::Text, level, cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let service = CastboardService::from_config(config).await?;
    let owner = cli.owner.as_str();

    match cli.command {
        Commands::Create {
            title,
            content,
            targets,
            at,
            image,
            draft,
        } => {
            let scheduled_at = match (at, draft) {
                (Some(at), _) => parse_time(&at)?,
                (None, true) => chrono::Utc::now().timestamp(),
                (None, false) => {
                    return Err(CastboardError::InvalidInput(
                        "--at is required unless --draft is given".to_string(),
                    ))
                }
            };
            let post = service
                .queue()
                .create(NewPost {
                    owner: owner.to_string(),
                    title,
                    content,
                    image_ref: image,
                    scheduled_at,
                    target_ids: targets,
                    draft,
                })
                .await?;
            println!("{}", post.id);
        }
        Commands::List { status, format } => {
            validate_format(&format)?;
            let status = status.map(|s| parse_status(&s)).transpose()?;
            let posts = service.queue().list(status, Some(owner)).await?;
            if format == "json" {
                print_json(&posts)?;
            } else {
                output_list_text(&posts);
            }
        }
        Commands::Show { post_id, format } => {
            validate_format(&format)?;
            let post = service
                .queue()
                .get(&post_id)
                .await?
                .ok_or_else(|| CastboardError::NotFound(format!("post '{}'", post_id)))?;
            if format == "json" {
                print_json(&post)?;
            } else {
                output_post_text(&post);
            }
        }
        Commands::Update {
            post_id,
            title,
            content,
            image,
            at,
            targets,
        } => {
            let update = PostUpdate {
                title,
                content,
                image_ref: image,
                scheduled_at: at.map(|at| parse_time(&at)).transpose()?,
                target_ids: if targets.is_empty() { None } else { Some(targets) },
            };
            let post = service.queue().update(&post_id, update).await?;
            println!("Updated post {}", post.id);
        }
        Commands::Submit { post_id, at } => {
            let at = at.map(|at| parse_time(&at)).transpose()?;
            let post = service.queue().submit(&post_id, at).await?;
            println!(
                "Scheduled post {} for {}",
                post.id,
                format_timestamp(post.scheduled_at)
            );
        }
        Commands::Cancel { post_id } => {
            service.queue().cancel(&post_id).await?;
            println!("Canceled post {}", post_id);
        }
        Commands::Reschedule { post_id, time } => {
            let at = parse_time(&time)?;
            service.queue().reschedule(&post_id, at).await?;
            println!("Rescheduled post {} to {}", post_id, format_timestamp(at));
        }
        Commands::Delete { post_id } => {
            service.queue().delete(&post_id).await?;
            println!("Deleted post {}", post_id);
        }
        Commands::Targets { action } => {
            let db = service.database();
            match action {
                TargetAction::List => {
                    let enabled = db.enabled_targets(owner).await?;
                    for target in db.list_targets().await? {
                        let mark = if enabled.iter().any(|t| t.id == target.id) {
                            "enabled"
                        } else {
                            "disabled"
                        };
                        let limit = target
                            .max_content_length
                            .map(|l| l.to_string())
                            .unwrap_or_else(|| "unlimited".to_string());
                        println!("{} | {} | {} | {} | {}", target.id, target.name, target.kind, limit, mark);
                    }
                }
                TargetAction::Enable { target_id } => {
                    db.set_target_enabled(owner, &target_id, true).await?;
                    println!("Enabled {} for {}", target_id, owner);
                }
                TargetAction::Disable { target_id } => {
                    db.set_target_enabled(owner, &target_id, false).await?;
                    println!("Disabled {} for {}", target_id, owner);
                }
            }
        }
        Commands::Activity { limit, format } => {
            validate_format(&format)?;
            let records = service.database().records_for(owner, limit).await?;
            if format == "json" {
                print_json(&records)?;
            } else {
                for record in records {
                    println!(
                        "{} | {} | {}",
                        format_timestamp(record.created_at),
                        record.action,
                        record.details
                    );
                }
            }
        }
    }

    Ok(())
}

fn parse_time(input: &str) -> Result<i64> {
    Ok(parse_schedule(input, chrono::Utc::now())?.timestamp())
}

fn parse_status(input: &str) -> Result<PostStatus> {
    input
        .parse()
        .map_err(|_| CastboardError::InvalidInput(format!("Invalid status '{}'", input)))
}

fn validate_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(CastboardError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CastboardError::InvalidInput(format!("Failed to serialize output: {}", e)))?;
    println!("{}", json);
    Ok(())
}

fn output_list_text(posts: &[Post]) {
    let now = chrono::Utc::now().timestamp();

    for post in posts {
        println!(
            "{} | {} | {} | {}",
            post.id,
            post.status,
            truncate_content(&post.title, 40),
            format_time_until(now, post.scheduled_at)
        );
    }
}

fn output_post_text(post: &Post) {
    println!("id:        {}", post.id);
    println!("title:     {}", post.title);
    println!("status:    {}", post.status);
    println!("scheduled: {}", format_timestamp(post.scheduled_at));
    if let Some(image) = &post.image_ref {
        println!("image:     {}", image);
    }
    println!();
    println!("{}", post.content);
    println!();
    for target in &post.targets {
        let detail = target
            .external_ref
            .as_deref()
            .or(target.error_message.as_deref())
            .unwrap_or("");
        println!("  {} | {} | {}", target.target_id, target.status, detail);
    }
}

/// Truncate to `max_chars` characters with ellipsis
fn truncate_content(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// Format time until scheduled time in human-readable format
fn format_time_until(now: i64, scheduled_at: i64) -> String {
    let diff = scheduled_at - now;

    if diff < 0 {
        return "overdue".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}
