use clap::Subcommand;
use timecard_core::Config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the current configuration as TOML
    Show,
    /// Set a configuration value
    Set {
        /// One of: user-id, user-name, lookahead-secs, skew-wait-cap-secs,
        /// tick-interval-secs
        key: String,
        value: String,
    },
    /// Print the configuration file path
    Path,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            match key.as_str() {
                "user-id" => config.identity.user_id = value,
                "user-name" => config.identity.user_name = value,
                "lookahead-secs" => config.executor.lookahead_secs = value.parse()?,
                "skew-wait-cap-secs" => config.executor.skew_wait_cap_secs = value.parse()?,
                "tick-interval-secs" => config.executor.tick_interval_secs = value.parse()?,
                other => return Err(format!("unknown config key: {other}").into()),
            }
            config.save()?;
            println!("Saved");
        }
        ConfigAction::Path => {
            println!("{}", Config::path()?.display());
        }
    }
    Ok(())
}
