pub mod config;
pub mod exec;
pub mod log;
pub mod reserve;
pub mod session;

use timecard_core::{Config, Database, SessionController};

/// Open the store and attach a controller for the configured identity.
pub fn attach_controller() -> Result<SessionController, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Database::open()?;
    let controller = SessionController::attach(
        db,
        config.identity.user_id.clone(),
        config.identity.user_name.clone(),
    )?;
    Ok(controller)
}
