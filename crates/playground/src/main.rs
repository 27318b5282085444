use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use directions::{
    client::{DirectionsCredentials, MapboxDirectionsClient},
    ApiError, DirectionsService,
};
use futures::StreamExt;
use model::{Coordinate, Profile, Route, WaypointPair};
use navigation::{NavigationConfig, NavigationSession, StartOutcome};
use tokio::runtime::Handle;
use tokio_stream::wrappers::WatchStream;

/// Where the simulated walk begins, `[longitude, latitude]`.
const START_LOCATION: [f64; 2] = [3.3750014, 6.5367877];
const FEED_STEPS: usize = 8;
const FEED_INTERVAL: Duration = Duration::from_millis(500);

/// Directions without a directions service: a straight line.
struct StraightLine;

#[async_trait]
impl DirectionsService for StraightLine {
    async fn fetch_routes(
        &self,
        waypoints: WaypointPair,
        _profile: Profile,
    ) -> Result<Vec<Route>, ApiError> {
        let line = interpolate(waypoints.origin, waypoints.destination, 4);
        Ok(vec![Route::new(line)?])
    }
}

fn interpolate(from: Coordinate, to: Coordinate, steps: usize) -> Vec<Coordinate> {
    (0..=steps)
        .filter_map(|step| {
            let t = step as f64 / steps as f64;
            Coordinate::new(
                from.longitude() + t * (to.longitude() - from.longitude()),
                from.latitude() + t * (to.latitude() - from.latitude()),
            )
            .ok()
        })
        .collect()
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = NavigationConfig::from_env().expect("expected a valid navigation config in env.");
    let directions: Arc<dyn DirectionsService> = match DirectionsCredentials::from_env() {
        Some(credentials) => Arc::new(
            MapboxDirectionsClient::new(&credentials).expect("could not build directions client."),
        ),
        None => {
            log::warn!("MAPBOX_ACCESS_TOKEN not set, using straight line directions.");
            Arc::new(StraightLine)
        }
    };

    let destination = config.destination;
    let session = NavigationSession::new(config, directions, Handle::current());

    // presentation
    let mut views = WatchStream::new(session.subscribe());
    let printer = tokio::spawn(async move {
        while let Some(view) = views.next().await {
            if !view.is_navigating() {
                log::info!("idle, camera at {}", view.camera_center());
                continue;
            }
            match serde_json::to_string_pretty(&view) {
                Ok(json) => println!("{json}"),
                Err(why) => log::error!("could not serialize view: {why}"),
            }
        }
    });
    let mut notices = session.subscribe_notices();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            println!("notice: {}", notice.error);
        }
    });

    // location feed
    let start = Coordinate::try_from(START_LOCATION).expect("start location out of range.");
    let mut walk = interpolate(start, destination, FEED_STEPS).into_iter();
    if let Some(position) = walk.next() {
        session.on_location_update(position);
    }

    if let StartOutcome::Rejected(why) = session.start() {
        log::error!("could not start navigation: {why}");
    }

    let mut ticker = tokio::time::interval(FEED_INTERVAL);
    for position in walk {
        ticker.tick().await;
        session.on_location_update(position);
    }
    session.stop();

    // the view stream ends with the last session handle
    drop(session);
    if let Err(why) = printer.await {
        log::error!("view printer failed: {why}");
    }
}
