use clap::Subcommand;
use serde::Serialize;
use timecard_core::{Restore, SessionController, TaskRef};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start tracking a task
    Start {
        /// Task name
        #[arg(required_unless_present = "other")]
        task: Option<String>,
        /// Free-form detail; records the task as "other: <detail>"
        #[arg(long, conflicts_with = "task")]
        other: Option<String>,
        /// Goal id within the task
        #[arg(long)]
        goal_id: Option<String>,
        /// Goal title within the task
        #[arg(long, requires = "goal_id")]
        goal_title: Option<String>,
    },
    /// Enter break, remembering the current task
    Break,
    /// Leave break and resume the remembered task
    Resume,
    /// Stop working
    Stop,
    /// Print current session state
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Confirm an automatic end-of-day closure
    Ack,
}

#[derive(Serialize)]
struct StatusView<'a> {
    user_id: &'a str,
    user_name: &'a str,
    is_working: bool,
    current_task: Option<&'a str>,
    current_goal_id: Option<&'a str>,
    current_goal_title: Option<&'a str>,
    start_time: Option<String>,
    elapsed_secs: Option<i64>,
    on_break: bool,
    needs_checkout_correction: bool,
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut controller = super::attach_controller()?;
    report_restore(&mut controller)?;

    match action {
        SessionAction::Start {
            task,
            other,
            goal_id,
            goal_title,
        } => {
            let task_ref = task_ref_from_args(task, other, goal_id, goal_title);
            let name = task_ref.task.clone();
            match controller.start_task(task_ref)? {
                Some(_) => println!("Started: {name}"),
                None => println!("Already on: {name}"),
            }
        }
        SessionAction::Break => match controller.start_break()? {
            Some(_) => println!("On break"),
            None => println!("Already on break"),
        },
        SessionAction::Resume => {
            controller.resume_from_break()?;
            match controller.state().current_task.as_deref() {
                Some(task) => println!("Resumed: {task}"),
                None => println!("Stopped (no task to resume)"),
            }
        }
        SessionAction::Stop => {
            controller.stop_work()?;
            println!("Stopped");
        }
        SessionAction::Status { json } => {
            let now = chrono::Utc::now();
            controller.tick()?;
            let state = controller.state();
            let view = StatusView {
                user_id: &state.user_id,
                user_name: &state.user_name,
                is_working: state.is_working,
                current_task: state.current_task.as_deref(),
                current_goal_id: state.current_goal_id.as_deref(),
                current_goal_title: state.current_goal_title.as_deref(),
                start_time: state.start_time.map(|t| t.to_rfc3339()),
                elapsed_secs: controller.elapsed_at(now).map(|d| d.num_seconds()),
                on_break: state.on_break(),
                needs_checkout_correction: state.needs_checkout_correction,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else if view.is_working {
                let task = view.current_task.unwrap_or("?");
                let elapsed = view.elapsed_secs.unwrap_or(0);
                println!("{task} for {}m {}s", elapsed / 60, elapsed % 60);
            } else {
                println!("idle");
            }
        }
        SessionAction::Ack => {
            controller.acknowledge_checkout_correction()?;
            println!("Acknowledged");
        }
    }
    Ok(())
}

/// Map start arguments to a task reference. An absent `--goal-title` stays
/// `None` so a later start with the same task and goal id compares equal.
fn task_ref_from_args(
    task: Option<String>,
    other: Option<String>,
    goal_id: Option<String>,
    goal_title: Option<String>,
) -> TaskRef {
    match (other, task) {
        (Some(detail), _) => TaskRef::other(&detail),
        (None, Some(task)) => {
            let mut task_ref = TaskRef::new(task);
            task_ref.goal_id = goal_id;
            task_ref.goal_title = goal_title;
            task_ref
        }
        (None, None) => unreachable!("clap enforces task or --other"),
    }
}

/// Reconcile before every interactive command; surface what happened.
fn report_restore(
    controller: &mut SessionController,
) -> Result<(), Box<dyn std::error::Error>> {
    match controller.restore_on_load()? {
        Restore::AutoClosed { task, end_time } => {
            eprintln!(
                "note: '{task}' was auto-closed at {}; run `timecard session ack` to confirm",
                end_time.to_rfc3339()
            );
        }
        Restore::Working { .. } | Restore::Idle => {
            if controller.state().needs_checkout_correction {
                eprintln!(
                    "note: a previous session was auto-closed; run `timecard session ack` to confirm"
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_goal_title_stays_none() {
        let first = task_ref_from_args(
            Some("support".into()),
            None,
            Some("g1".into()),
            None,
        );
        assert_eq!(first.goal_id.as_deref(), Some("g1"));
        assert_eq!(first.goal_title, None);

        // Identical invocations must compare equal so restarts no-op.
        let second = task_ref_from_args(
            Some("support".into()),
            None,
            Some("g1".into()),
            None,
        );
        assert_eq!(first, second);
    }

    #[test]
    fn other_detail_wins_and_prefixes() {
        let t = task_ref_from_args(None, Some("errand".into()), None, None);
        assert_eq!(t.task, "other: errand");
        assert_eq!(t.goal_id, None);
    }
}
