use time::macros::format_description;
use tracing_subscriber::{
    EnvFilter, fmt::time::LocalTime, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

pub fn init_log() -> eyre::Result<()> {
    let filter = EnvFilter::from_default_env();
    let registry = tracing_subscriber::registry();
    registry
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_timer(LocalTime::new(format_description!(
                    "[year repr:last_two]-[month]-[day] [hour]:[minute]:[second]"
                ))),
        )
        .try_init()?;

    Ok(())
}
