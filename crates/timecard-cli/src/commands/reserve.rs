use chrono::{NaiveTime, Utc};
use clap::Subcommand;
use timecard_core::{Config, Database, Reservation, ReservationAction, SessionError};

#[derive(Subcommand)]
pub enum ReserveAction {
    /// Create or replace a reservation (daily-recurring)
    Set {
        /// "break" or "stop"
        action: String,
        /// Time of day, HH:MM (UTC)
        #[arg(long)]
        at: String,
    },
    /// List this user's reservations
    List {
        #[arg(long)]
        json: bool,
    },
    /// Clear today's consumption markers so reservations can fire again
    Rearm,
    /// Remove a reservation by id
    Clear { id: String },
}

pub fn run(action: ReserveAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Database::open()?;
    let user_id = &config.identity.user_id;
    let user_name = &config.identity.user_name;

    match action {
        ReserveAction::Set { action, at } => {
            let action = ReservationAction::parse(&action)
                .ok_or_else(|| format!("unknown action '{action}': expected break or stop"))?;
            let time = NaiveTime::parse_from_str(&at, "%H:%M")
                .map_err(|_| SessionError::InvalidReservationTime(at.clone()))?;
            // First occurrence: today if still ahead, otherwise tomorrow.
            let now = Utc::now();
            let today_at = now.date_naive().and_time(time).and_utc();
            let scheduled = if today_at > now {
                today_at
            } else {
                today_at + chrono::Duration::days(1)
            };
            let reservation = match action {
                ReservationAction::Break => Reservation::break_at(user_id, user_name, scheduled),
                ReservationAction::Stop => Reservation::stop(user_id, user_name, scheduled),
            };
            db.upsert_reservation(&reservation)?;
            println!(
                "Reserved {} daily at {} (first: {})",
                action.as_str(),
                time.format("%H:%M"),
                scheduled.to_rfc3339()
            );
        }
        ReserveAction::List { json } => {
            let reservations = db.list_reservations(user_id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&reservations)?);
            } else if reservations.is_empty() {
                println!("no reservations");
            } else {
                let today = Utc::now().date_naive();
                for r in reservations {
                    let consumed = if r.last_executed_date == Some(today) {
                        " (consumed today)"
                    } else {
                        ""
                    };
                    println!(
                        "{}  {}  daily at {}{}",
                        r.id,
                        r.action.as_str(),
                        r.scheduled_time.format("%H:%M"),
                        consumed
                    );
                }
            }
        }
        ReserveAction::Rearm => {
            let cleared = db.rearm_reservations_on(user_id, Utc::now().date_naive())?;
            println!("Re-armed {cleared} reservation(s) for today");
        }
        ReserveAction::Clear { id } => {
            if db.delete_reservation(&id)? {
                println!("Removed {id}");
            } else {
                println!("No reservation {id}");
            }
        }
    }
    Ok(())
}
