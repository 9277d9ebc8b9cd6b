//! crowd-scheduler
//!
//! Assigns crowdsourcing tasks to contributors and records their answers.

use anyhow::{Context, Result, bail};
use clap::Parser;
use crowd_scheduler::cli::export::ExportArgs;
use crowd_scheduler::cli::{
    AnswerArgs, Cli, Command, NewTaskArgs, ProjectCommand, ServeArgs, TaskCommand, parse_json_arg,
};
use crowd_scheduler::config::{Config, ConfigLoader};
use crowd_scheduler::db::Database;
use crowd_scheduler::logging;
use crowd_scheduler::sched::lease::ExpiringLease;
use crowd_scheduler::sched::{Scheduler, SchedulingPolicy};
use crowd_scheduler::server;
use crowd_scheduler::types::{NewProject, NewTask, NewTaskRun, Requester, TaskState};
use serde::Serialize;
use serde_json::{Value, json};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log, cli.verbose)?;

    let mut loader = ConfigLoader::load(cli.config.as_deref().map(Path::new))?;
    if let Some(db_path) = &cli.database {
        loader.config_mut().server.db_path = db_path.into();
    }
    debug!(sources = ?loader.sources(), "Using configuration");
    let config = loader.into_config();

    config.ensure_db_dir()?;
    let db = Arc::new(Database::open(&config.server.db_path)?);
    let scheduler = Arc::new(build_scheduler(&config, Arc::clone(&db)));

    match cli.command {
        Some(Command::Serve(args)) => run_server(&config, scheduler, args).await?,
        None => run_server(&config, scheduler, ServeArgs::default()).await?,
        Some(Command::Project(cmd)) => run_project(&db, cmd)?,
        Some(Command::Task(cmd)) => run_task(&config, &db, cmd)?,
        Some(Command::NewTask(args)) => run_new_task(&scheduler, args)?,
        Some(Command::Answer(args)) => run_answer(&config, &scheduler, args)?,
        Some(Command::Stats { project }) => print_json(&db.project_stats(project)?)?,
        Some(Command::Progress { project, requester }) => {
            let requester = Requester::resolve_with_fallback(
                requester.user_id,
                requester.user_ip.as_deref(),
                &config.scheduler.anonymous_ip,
            );
            print_json(&db.user_progress(project, &requester)?)?;
        }
        Some(Command::Export(args)) => run_export(&db, args)?,
    }

    Ok(())
}

fn build_scheduler(config: &Config, db: Arc<Database>) -> Scheduler {
    let mut scheduler = Scheduler::new(db)
        .with_window(config.scheduler.candidate_window)
        .with_fallback_ip(config.scheduler.anonymous_ip.clone());

    if let Some(secs) = config.scheduler.lease_seconds {
        scheduler = scheduler.with_lease_strategy(Arc::new(ExpiringLease::new(Duration::from_secs(secs))));
    }
    debug!(
        window = scheduler.window(),
        lease = scheduler.lease_strategy().name(),
        "Scheduler configured"
    );
    scheduler
}

async fn run_server(config: &Config, scheduler: Arc<Scheduler>, args: ServeArgs) -> Result<()> {
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let port = args.port.unwrap_or(config.server.port);
    info!(db = %config.server.db_path.display(), "Starting scheduler API");
    server::serve(scheduler, &bind, port).await
}

fn run_project(db: &Database, cmd: ProjectCommand) -> Result<()> {
    match cmd {
        ProjectCommand::Create {
            short_name,
            name,
            sched,
            no_anonymous,
        } => {
            let info = sched.map(|s| json!({ "sched": SchedulingPolicy::from(s).as_str() }));
            let project = db.create_project(NewProject {
                short_name,
                name: name.unwrap_or_default(),
                allow_anonymous_contributors: !no_anonymous,
                info,
            })?;
            print_json(&project)
        }
        ProjectCommand::List => print_json(&db.list_projects()?),
        ProjectCommand::SetSched { project, sched } => {
            print_json(&db.set_project_policy(project, sched.into())?)
        }
        ProjectCommand::SetAnonymous { project, allow } => {
            print_json(&db.set_allow_anonymous(project, allow)?)
        }
    }
}

fn run_task(config: &Config, db: &Database, cmd: TaskCommand) -> Result<()> {
    match cmd {
        TaskCommand::Add {
            project,
            n_answers,
            priority,
            info,
        } => {
            let info = info
                .map(|raw| serde_json::from_str::<Value>(&raw).context("--info must be JSON"))
                .transpose()?;
            let task = db.create_task(
                project,
                NewTask {
                    n_answers: Some(n_answers.unwrap_or(config.scheduler.default_n_answers)),
                    priority_0: priority,
                    info,
                },
            )?;
            print_json(&task)
        }
        TaskCommand::List { project, state } => {
            let state = match state.as_deref() {
                None => None,
                Some(s) => match TaskState::from_str(s) {
                    Some(state) => Some(state),
                    None => bail!("unknown task state '{}' (expected ongoing or completed)", s),
                },
            };
            print_json(&db.list_tasks(project, state)?)
        }
        TaskCommand::Redundancy { project, n_answers } => {
            print_json(&db.set_project_redundancy(project, n_answers)?)
        }
    }
}

fn run_new_task(scheduler: &Scheduler, args: NewTaskArgs) -> Result<()> {
    let assignment = scheduler.new_task(
        args.project,
        args.requester.user_id,
        args.requester.user_ip.as_deref(),
        args.offset,
    )?;
    print_json(&assignment.to_legacy_json())
}

fn run_answer(config: &Config, scheduler: &Scheduler, args: AnswerArgs) -> Result<()> {
    let requester = Requester::resolve_with_fallback(
        args.requester.user_id,
        args.requester.user_ip.as_deref(),
        &config.scheduler.anonymous_ip,
    );
    let run = scheduler.submit_task_run(NewTaskRun {
        project_id: args.project,
        task_id: args.task,
        user_id: requester.user_id(),
        user_ip: requester.user_ip().map(String::from),
        info: args.info.as_deref().map(parse_json_arg).unwrap_or(Value::Null),
    })?;
    print_json(&run)
}

fn run_export(db: &Database, args: ExportArgs) -> Result<()> {
    let snapshot = db.export_project(args.project, !args.no_task_runs)?;
    let size = snapshot.to_json_pretty()?.len() as u64;
    let compress = args.should_compress(Some(size));

    match args.output_path(compress) {
        Some(path) => {
            let file = std::fs::File::create(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            let mut writer = std::io::BufWriter::new(file);
            snapshot.write_to(&mut writer, compress)?;
            writer.flush()?;
            info!(
                project_id = args.project,
                path = %path.display(),
                tasks = snapshot.tasks.len(),
                task_runs = snapshot.task_runs.len(),
                compressed = compress,
                "Project exported"
            );
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            snapshot.write_to(&mut lock, compress)?;
            lock.flush()?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
