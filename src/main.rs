use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dropout_early_warning::models::Role;
use dropout_early_warning::scenarios::{self, ScenarioKind};
use dropout_early_warning::system::DetectionSystem;

#[derive(Parser)]
#[command(name = "dropout-early-warning")]
#[command(about = "Question-level dropout early warning for learners", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the struggling-learner walkthrough and print both views
    Demo,
    /// Seed a named scenario and print the chosen view
    Scenario {
        /// healthy, cognitive, behavioral, engagement, silent, or struggling
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "teacher")]
        role: String,
        /// Print the structured view as JSON instead of markdown
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Write the teacher markdown report for a scenario
    Report {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn parse_scenario(name: &str) -> anyhow::Result<ScenarioKind> {
    match ScenarioKind::parse(name) {
        Some(kind) => Ok(kind),
        None => {
            let known: Vec<&str> = ScenarioKind::all().iter().map(|k| k.name()).collect();
            bail!("unknown scenario '{name}' (expected one of: {})", known.join(", "));
        }
    }
}

fn parse_role(role: &str) -> anyhow::Result<Role> {
    match role {
        "student" => Ok(Role::Student),
        "teacher" => Ok(Role::Teacher),
        other => bail!("unknown role '{other}' (expected student or teacher)"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let system = DetectionSystem::new();

    match cli.command {
        Commands::Demo => {
            let seeded = scenarios::seed(&system, ScenarioKind::Struggling).await?;
            println!(
                "Scenario '{}': {}",
                seeded.kind.name(),
                seeded.kind.description()
            );
            println!();

            let teacher = system
                .analyze(&seeded.student_id, &seeded.question_id, None, None, Role::Teacher)
                .await?;
            println!("{}", teacher.render_markdown());

            let student = system
                .analyze(&seeded.student_id, &seeded.question_id, None, None, Role::Student)
                .await?;
            println!("{}", student.render_markdown());
        }
        Commands::Scenario { name, role, json } => {
            let kind = parse_scenario(&name)?;
            let role = parse_role(&role)?;
            let seeded = scenarios::seed(&system, kind).await?;
            let view = system
                .analyze(&seeded.student_id, &seeded.question_id, None, None, role)
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                println!("{}", view.render_markdown());
            }
        }
        Commands::Report { name, out } => {
            let kind = parse_scenario(&name)?;
            let seeded = scenarios::seed(&system, kind).await?;
            let view = system
                .analyze(&seeded.student_id, &seeded.question_id, None, None, Role::Teacher)
                .await?;
            std::fs::write(&out, view.render_markdown())?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
