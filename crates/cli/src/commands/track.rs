use std::sync::Arc;

use helixbook_client::{ClientSettings, HttpPortalClient};
use helixbook_core::config::{AppConfig, LoadOptions};
use helixbook_core::domain::booking::BookingId;
use helixbook_core::errors::PortalError;
use helixbook_core::ports::RecordingNavigator;
use helixbook_core::{BookingSession, BookingView, Collaborators, FeedbackCache};
use helixbook_db::{connect_storage, migrations, SqliteKeyValueStore};
use tracing::info;

use crate::commands::CommandResult;

type Failure = (&'static str, String, u8);

pub fn run(booking_id: &str) -> CommandResult {
    let booking_id = booking_id.trim();
    if booking_id.is_empty() {
        return CommandResult::failure("track", "invalid_argument", "booking id is empty", 2);
    }

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "track",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "track",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let booking_id = BookingId(booking_id.to_string());
    match runtime.block_on(track(&config, &booking_id)) {
        Ok(view) => CommandResult::success_with(
            "track",
            format!("booking {} is {}", view.booking.id, view.booking.status),
            &view,
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("track", error_class, message, exit_code)
        }
    }
}

async fn track(config: &AppConfig, booking_id: &BookingId) -> Result<BookingView, Failure> {
    let pool = connect_storage(&config.storage)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), 5u8))?;

    let client = HttpPortalClient::new(ClientSettings::from_config(&config.api))
        .map_err(|error| ("client_init", error.to_string(), 2u8))?;
    let client = Arc::new(client);

    let collaborators = Collaborators {
        bookings: client.clone(),
        payments: client.clone(),
        samples: client.clone(),
    };
    let session = BookingSession::new(
        collaborators,
        Arc::new(SqliteKeyValueStore::new(pool.clone())),
        Arc::new(FeedbackCache::new(client)),
        Arc::new(RecordingNavigator::default()),
    );

    session.open(booking_id);
    let view = session.refresh().await.map_err(portal_failure);
    pool.close().await;

    let view = view?;
    info!(
        event_name = "cli.track.refreshed",
        booking_id = %view.booking.id,
        status = %view.booking.status,
        current_step = view.progress.current_step,
        "booking refreshed"
    );
    Ok(view)
}

fn portal_failure(error: PortalError) -> Failure {
    let class = match &error {
        PortalError::Remote(remote) => remote.kind.as_str(),
        PortalError::Store(_) => "local_store",
        PortalError::Rejected(_) => "rejected",
        PortalError::StaleResponse { .. } | PortalError::NoActiveBooking => "stale_view",
    };
    (class, format!("{} ({error})", error.user_message()), 6)
}
