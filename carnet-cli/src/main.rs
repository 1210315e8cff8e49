use anyhow::{Result, bail};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use log::{error, info};
use std::path::PathBuf;

use carnet::config::{Config, DEFAULT_DB_PATH, DEFAULT_EXERCISES_DB, DEFAULT_WORKOUTS_DB};
use carnet::entity::Workout;
use carnet::logging::{set_debug_log_level, set_log_level};
use carnet::report::{week_streak, weekly_minutes, workout_summaries};

#[derive(Parser, Debug)]
#[command(version, about = "Carnet - Notion workout log sync", long_about = None)]
struct Args {
    /// Local SQLite store
    #[arg(long, env = "CARNET_DB_PATH", default_value = DEFAULT_DB_PATH, global = true)]
    db_path: PathBuf,

    #[arg(long, env = "NOTION_TOKEN", hide_env_values = true, global = true)]
    notion_token: Option<String>,

    #[arg(long, env = "CARNET_EXERCISES_DB", default_value = DEFAULT_EXERCISES_DB, global = true)]
    exercises_db: String,

    #[arg(long, env = "CARNET_WORKOUTS_DB", default_value = DEFAULT_WORKOUTS_DB, global = true)]
    workouts_db: String,

    #[arg(long, env = "CARNET_LOG", default_value = "info", global = true)]
    log: String,

    /// Trace everything, SQL statements and HTTP traffic included
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync the exercise catalog, then reconcile one batch of workouts
    Sync {
        #[arg(short, long)]
        limit: Option<usize>,
        /// Re-read every listed workout from Notion, overwriting local rows
        #[arg(short, long)]
        refresh: bool,
    },
    /// Show one workout, fetching it from Notion if it is not stored yet
    Workout {
        id: String,
        #[arg(short, long)]
        refresh: bool,
    },
    /// Print stored workouts and this week's training
    Report {
        /// Workout names that make a week complete for the streak
        #[arg(long = "require")]
        required: Vec<String>,
    },
}

impl Args {
    fn config(&self) -> Result<Config> {
        let Some(token) = self.notion_token.clone() else {
            bail!("NOTION_TOKEN is not set");
        };
        let mut config = Config::new(token);
        config.db_path = self.db_path.clone();
        config.exercises_db = self.exercises_db.clone();
        config.workouts_db = self.workouts_db.clone();
        Ok(config)
    }
}

fn print_workout(workout: &Workout) {
    println!(
        "{} [{}] {} min, {} sets",
        workout,
        workout
            .body_part
            .map(|b| b.to_string())
            .unwrap_or_else(|| "?".into()),
        workout.duration.num_minutes(),
        workout.set_count()
    );
    for (exercise, sets) in &workout.content {
        println!("  {}", exercise);
        for set in sets {
            println!("\t{}", set);
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();
    if args.debug {
        set_debug_log_level();
    } else if !set_log_level(&args.log) {
        bail!("Unknown log level '{}'", args.log);
    }

    match &args.command {
        Commands::Sync { limit, refresh } => {
            let mut config = args.config()?;
            config.batch_limit = *limit;
            let reconciler = config.reconciler().await?;
            let report = reconciler
                .reconcile_batch(config.batch_limit, *refresh)
                .await?;
            for failure in report.catalog.failures.iter().chain(report.failures.iter()) {
                error!("{}: {}", failure.id, failure.error);
            }
            if report.has_fatal() {
                bail!("Sync finished with unrecoverable failures");
            }
            info!(
                "Sync complete: {} imported, {} already stored",
                report.imported.len(),
                report.cached.len()
            );
            Ok(())
        }
        Commands::Workout { id, refresh } => {
            let reconciler = args.config()?.reconciler().await?;
            let workout = if *refresh {
                reconciler.refresh_workout(id).await?
            } else {
                reconciler.workout_by_id(id).await?
            };
            print_workout(&workout);
            Ok(())
        }
        Commands::Report { required } => {
            let pool = carnet::db::open(&args.db_path).await?;
            let summaries = workout_summaries(&pool).await?;
            if summaries.is_empty() {
                println!("No workouts stored yet. Run `carnet sync` first.");
            }
            for s in &summaries {
                println!(
                    "{}  {:<24} {:>4} min {:>3} sets {:>5} reps {:>9.1} kg",
                    s.date.format("%Y-%m-%d"),
                    s.name.as_deref().unwrap_or("Unnamed Workout"),
                    s.duration.num_minutes(),
                    s.set_count,
                    s.total_reps,
                    s.volume
                );
            }

            let today = Utc::now().date_naive();
            println!(
                "This week: {} min",
                weekly_minutes(&pool, today).await?
            );
            if !required.is_empty() {
                let names: Vec<&str> = required.iter().map(String::as_str).collect();
                println!(
                    "Streak: {} week(s)",
                    week_streak(&pool, &names, today).await?
                );
            }
            let totals = carnet::report::totals_since(&pool, Utc::now() - Duration::days(30)).await?;
            println!(
                "Last 30 days: {} workouts, {} reps, {:.1} kg",
                totals.workouts, totals.total_reps, totals.total_volume
            );
            Ok(())
        }
    }
}
