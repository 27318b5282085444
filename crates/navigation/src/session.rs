use std::{
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use directions::{ApiError, DirectionsService};
use futures::FutureExt;
use model::{Coordinate, Route};
use tokio::{
    runtime::Handle,
    sync::{broadcast, watch},
    task::JoinHandle,
};

use crate::{
    config::NavigationConfig,
    state::{Resolution, RouteRequest, SessionCore, StartOutcome},
    view::SessionView,
    Generation, NavigationError, Notice, RouteUnavailableReason,
};

const NOTICE_CAPACITY: usize = 16;

struct Shared {
    core: Mutex<SessionCore>,
    config: NavigationConfig,
    directions: Arc<dyn DirectionsService>,
    runtime: Handle,
    views: watch::Sender<SessionView>,
    notices: broadcast::Sender<Notice>,
}

/// Handle to a navigation session. Cheap to clone; the session lives as long
/// as any handle does. Route requests still in flight do not keep it alive.
#[derive(Clone)]
pub struct NavigationSession {
    shared: Arc<Shared>,
}

impl NavigationSession {
    /// Route requests are spawned on `runtime`. If that runtime shuts down
    /// while a request is pending, or before it could be spawned, the request
    /// fails as [`RouteUnavailableReason::Cancelled`] and the session goes
    /// back to idle.
    pub fn new(
        config: NavigationConfig,
        directions: Arc<dyn DirectionsService>,
        runtime: Handle,
    ) -> Self {
        let core = SessionCore::new(config.destination);
        let (views, _) = watch::channel(core.view());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                config,
                directions,
                runtime,
                views,
                notices,
            }),
        }
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.shared.config
    }

    /// Starts navigating unless a session is already running. Returns right
    /// away; the route request runs in the background and its handle can be
    /// awaited or dropped.
    pub fn start(&self) -> StartOutcome<JoinHandle<Resolution>> {
        let mut core = self.lock();
        let outcome = core.start(self.shared.config.missing_location);
        match &outcome {
            StartOutcome::Requested(request) => {
                log::info!(
                    "navigation started (generation {}), requesting route {} -> {}",
                    request.generation,
                    request.waypoints.origin,
                    request.waypoints.destination
                );
                self.publish(&core);
            }
            StartOutcome::Deferred { generation } => {
                log::info!(
                    "navigation started (generation {generation}), waiting for a location"
                );
                self.publish(&core);
            }
            StartOutcome::AlreadyNavigating => {
                log::debug!("start ignored, already navigating");
            }
            StartOutcome::Rejected(error) => {
                log::warn!("start rejected: {error}");
                self.notify(core.generation(), error.clone());
            }
        }
        drop(core);
        outcome.map(|request| self.dispatch(request))
    }

    /// Stops navigating and forgets the route. Requests still in flight will
    /// be ignored when they finish.
    pub fn stop(&self) {
        let mut core = self.lock();
        if core.stop() {
            log::info!("navigation stopped (generation {})", core.generation());
            self.publish(&core);
        }
    }

    /// Records the latest position reported by the location feed.
    pub fn on_location_update(&self, position: Coordinate) {
        let mut core = self.lock();
        let deferred = core.update_position(position);
        self.publish(&core);
        drop(core);

        if let Some(request) = deferred {
            log::info!(
                "location available, requesting route for generation {}",
                request.generation
            );
            self.dispatch(request);
        }
    }

    pub fn current_view(&self) -> SessionView {
        self.lock().view()
    }

    /// Receives a new view after every transition or position change.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.shared.views.subscribe()
    }

    /// Receives failures the user should be told about.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.shared.notices.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, SessionCore> {
        self.shared
            .core
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Must be called with the core locked, so views go out in transition order.
    fn publish(&self, core: &SessionCore) {
        self.shared.views.send_replace(core.view());
    }

    fn notify(&self, generation: Generation, error: NavigationError) {
        if !error.is_user_visible() {
            log::debug!("not telling the user: {error}");
            return;
        }
        // no receivers is fine
        let _ = self.shared.notices.send(Notice::new(generation, error));
    }

    /// Must be called without holding the core lock: a runtime that has shut
    /// down drops the task, and with it `pending`, right inside `spawn`.
    fn dispatch(&self, request: RouteRequest) -> JoinHandle<Resolution> {
        let pending = PendingRequest {
            session: Arc::downgrade(&self.shared),
            generation: request.generation,
            settled: false,
        };
        let directions = Arc::clone(&self.shared.directions);
        let profile = self.shared.config.profile;
        let timeout = self.shared.config.fetch_timeout;

        self.shared.runtime.spawn(async move {
            let fetch = AssertUnwindSafe(directions.fetch_routes(request.waypoints, profile))
                .catch_unwind()
                .map(|outcome| match outcome {
                    Ok(result) => result.map_err(RouteUnavailableReason::Service),
                    Err(_) => Err(RouteUnavailableReason::Service(ApiError::Other(
                        "directions service panicked".to_owned(),
                    ))),
                });
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, fetch)
                    .await
                    .unwrap_or(Err(RouteUnavailableReason::TimedOut(limit))),
                None => fetch.await,
            };

            pending.settle(result)
        })
    }

    fn resolve(
        &self,
        generation: Generation,
        result: Result<Vec<Route>, RouteUnavailableReason>,
    ) -> Resolution {
        let mut core = self.lock();
        let resolution = core.resolve(generation, result);
        match &resolution {
            Resolution::Applied => {
                if let Some(route) = core.route() {
                    log::info!(
                        "route received, navigating {} -> {} (generation {generation})",
                        route.origin(),
                        route.destination()
                    );
                }
                self.publish(&core);
            }
            Resolution::Failed(error) => {
                log::warn!("generation {generation}: {error}");
                self.publish(&core);
                self.notify(generation, error.clone());
            }
            Resolution::Stale(error) => {
                log::debug!("{error}, discarded");
            }
        }
        resolution
    }
}

/// A route request that has not been resolved yet. Resolves its generation as
/// cancelled when dropped unsettled, so the session cannot get stuck waiting.
struct PendingRequest {
    session: Weak<Shared>,
    generation: Generation,
    settled: bool,
}

impl PendingRequest {
    fn settle(mut self, result: Result<Vec<Route>, RouteUnavailableReason>) -> Resolution {
        self.settled = true;
        match self.session.upgrade() {
            Some(shared) => NavigationSession { shared }.resolve(self.generation, result),
            // every handle is gone, nobody is navigating anymore
            None => Resolution::Stale(NavigationError::StaleResult {
                issued: self.generation,
                current: self.generation,
            }),
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(shared) = self.session.upgrade() {
            log::warn!(
                "route request for generation {} was dropped before it finished",
                self.generation
            );
            NavigationSession { shared }
                .resolve(self.generation, Err(RouteUnavailableReason::Cancelled));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use model::{Profile, WaypointPair};
    use tokio::sync::Semaphore;

    use super::*;
    use crate::{config::MissingLocationPolicy, state::SessionState};

    /// Answers every request the same way, optionally holding each answer
    /// back until it is released.
    struct ScriptedDirections {
        answer: Result<Vec<Route>, ApiError>,
        gate: Option<Semaphore>,
        calls: AtomicUsize,
        requests: Mutex<Vec<WaypointPair>>,
    }

    impl ScriptedDirections {
        fn answering(answer: Result<Vec<Route>, ApiError>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                gate: None,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn gated(answer: Result<Vec<Route>, ApiError>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                gate: Some(Semaphore::new(0)),
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn release(&self) {
            if let Some(gate) = &self.gate {
                gate.add_permits(1);
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn requests(&self) -> Vec<WaypointPair> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DirectionsService for ScriptedDirections {
        async fn fetch_routes(
            &self,
            waypoints: WaypointPair,
            profile: Profile,
        ) -> Result<Vec<Route>, ApiError> {
            assert_eq!(profile, Profile::Walking);
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(waypoints);
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            self.answer.clone()
        }
    }

    struct PanickingDirections;

    #[async_trait]
    impl DirectionsService for PanickingDirections {
        async fn fetch_routes(
            &self,
            _waypoints: WaypointPair,
            _profile: Profile,
        ) -> Result<Vec<Route>, ApiError> {
            panic!("directions backend exploded")
        }
    }

    fn coordinate(longitude: f64, latitude: f64) -> Coordinate {
        Coordinate::new(longitude, latitude).unwrap()
    }

    fn start_position() -> Coordinate {
        coordinate(3.375, 6.5368)
    }

    fn config() -> NavigationConfig {
        NavigationConfig::new(coordinate(4.33624, 6.57901))
    }

    fn three_point_route() -> Route {
        Route::new(vec![
            start_position(),
            coordinate(3.9, 6.55),
            coordinate(4.33624, 6.57901),
        ])
        .unwrap()
    }

    fn session(
        directions: Arc<dyn DirectionsService>,
        config: NavigationConfig,
    ) -> NavigationSession {
        NavigationSession::new(config, directions, Handle::current())
    }

    fn requested(outcome: StartOutcome<JoinHandle<Resolution>>) -> JoinHandle<Resolution> {
        match outcome {
            StartOutcome::Requested(handle) => handle,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn resolved_route_activates_session() {
        let directions = ScriptedDirections::answering(Ok(vec![three_point_route()]));
        let session = session(directions.clone(), config());
        session.on_location_update(start_position());

        let resolution = requested(session.start()).await.unwrap();
        assert!(matches!(resolution, Resolution::Applied));

        let view = session.current_view();
        assert_eq!(view.state, SessionState::Active);
        assert!(view.is_navigating());
        assert_eq!(
            view.route.unwrap().coordinates(),
            three_point_route().coordinates()
        );
        assert_eq!(view.origin, Some(start_position()));
        assert_eq!(view.progress.unwrap().nearest_segment, 0);

        assert_eq!(directions.calls(), 1);
        assert_eq!(
            directions.requests(),
            vec![WaypointPair::new(start_position(), coordinate(4.33624, 6.57901))]
        );
    }

    #[tokio::test]
    async fn repeated_start_sends_one_request() {
        let directions = ScriptedDirections::gated(Ok(vec![three_point_route()]));
        let session = session(directions.clone(), config());
        session.on_location_update(start_position());

        let fetch = requested(session.start());
        assert!(matches!(session.start(), StartOutcome::AlreadyNavigating));
        assert_eq!(session.current_view().generation, 1);

        directions.release();
        fetch.await.unwrap();
        assert!(matches!(session.start(), StartOutcome::AlreadyNavigating));
        assert_eq!(directions.calls(), 1);
        assert_eq!(session.current_view().generation, 1);
    }

    #[tokio::test]
    async fn stop_before_resolution_discards_route() {
        let directions = ScriptedDirections::gated(Ok(vec![three_point_route()]));
        let session = session(directions.clone(), config());
        session.on_location_update(start_position());

        let fetch = requested(session.start());
        session.stop();
        directions.release();

        let resolution = fetch.await.unwrap();
        assert!(matches!(
            resolution,
            Resolution::Stale(NavigationError::StaleResult {
                issued: 1,
                current: 2
            })
        ));
        let view = session.current_view();
        assert_eq!(view.state, SessionState::Idle);
        assert!(!view.is_navigating());
        assert!(view.route.is_none());
    }

    #[tokio::test]
    async fn restart_ignores_earlier_request() {
        let directions = ScriptedDirections::gated(Ok(vec![three_point_route()]));
        let session = session(directions.clone(), config());
        session.on_location_update(start_position());

        let first = requested(session.start());
        session.stop();
        let second = requested(session.start());
        directions.release();
        directions.release();

        assert!(matches!(first.await.unwrap(), Resolution::Stale(_)));
        assert!(matches!(second.await.unwrap(), Resolution::Applied));
        let view = session.current_view();
        assert_eq!(view.state, SessionState::Active);
        assert_eq!(view.generation, 3);
        assert_eq!(directions.calls(), 2);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let directions = ScriptedDirections::answering(Ok(vec![three_point_route()]));
        let session = session(directions, config());
        session.stop();
        assert_eq!(session.current_view().generation, 0);

        session.on_location_update(start_position());
        requested(session.start()).await.unwrap();
        session.stop();
        let stopped = session.current_view();
        assert_eq!(stopped.state, SessionState::Idle);
        assert!(stopped.route.is_none());

        session.stop();
        assert_eq!(session.current_view(), stopped);
    }

    #[tokio::test]
    async fn start_without_location_is_rejected() {
        let directions = ScriptedDirections::answering(Ok(vec![three_point_route()]));
        let session = session(directions.clone(), config());
        let mut notices = session.subscribe_notices();

        assert!(matches!(
            session.start(),
            StartOutcome::Rejected(NavigationError::LocationUnavailable)
        ));
        let notice = notices.recv().await.unwrap();
        assert!(matches!(notice.error, NavigationError::LocationUnavailable));
        assert_eq!(session.current_view().state, SessionState::Idle);
        assert_eq!(directions.calls(), 0);
    }

    #[tokio::test]
    async fn deferred_start_waits_for_location() {
        let directions = ScriptedDirections::answering(Ok(vec![three_point_route()]));
        let mut config = config();
        config.missing_location = MissingLocationPolicy::Defer;
        let session = session(directions.clone(), config);
        let mut views = session.subscribe();

        assert!(matches!(
            session.start(),
            StartOutcome::Deferred { generation: 1 }
        ));
        assert_eq!(session.current_view().state, SessionState::RequestingRoute);
        assert_eq!(directions.calls(), 0);

        session.on_location_update(start_position());
        views
            .wait_for(|view| view.state == SessionState::Active)
            .await
            .unwrap();
        assert_eq!(directions.calls(), 1);
        assert_eq!(directions.requests()[0].origin, start_position());
    }

    #[tokio::test]
    async fn empty_route_list_notifies_user() {
        let directions = ScriptedDirections::answering(Ok(vec![]));
        let session = session(directions, config());
        let mut notices = session.subscribe_notices();
        session.on_location_update(start_position());

        let resolution = requested(session.start()).await.unwrap();
        assert!(matches!(resolution, Resolution::Failed(_)));

        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.generation, 1);
        assert!(matches!(
            notice.error,
            NavigationError::RouteUnavailable(RouteUnavailableReason::EmptyRouteList)
        ));
        let view = session.current_view();
        assert_eq!(view.state, SessionState::Idle);
        assert!(view.route.is_none());
    }

    #[tokio::test]
    async fn service_error_returns_to_idle() {
        let directions = ScriptedDirections::answering(Err(ApiError::NoRoute {
            code: "NoSegment".to_owned(),
            message: None,
        }));
        let session = session(directions, config());
        session.on_location_update(start_position());

        let resolution = requested(session.start()).await.unwrap();
        assert!(matches!(
            resolution,
            Resolution::Failed(NavigationError::RouteUnavailable(
                RouteUnavailableReason::Service(ApiError::NoRoute { .. })
            ))
        ));
        assert_eq!(session.current_view().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn hung_request_times_out() {
        let directions = ScriptedDirections::gated(Ok(vec![three_point_route()]));
        let mut config = config();
        config.fetch_timeout = Some(Duration::from_millis(20));
        let session = session(directions, config);
        session.on_location_update(start_position());

        let resolution = requested(session.start()).await.unwrap();
        assert!(matches!(
            resolution,
            Resolution::Failed(NavigationError::RouteUnavailable(
                RouteUnavailableReason::TimedOut(_)
            ))
        ));
        assert_eq!(session.current_view().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn panicking_service_is_contained() {
        let session = session(Arc::new(PanickingDirections), config());
        session.on_location_update(start_position());

        let resolution = requested(session.start()).await.unwrap();
        assert!(matches!(resolution, Resolution::Failed(_)));
        assert_eq!(session.current_view().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn location_updates_only_move_the_user() {
        let directions = ScriptedDirections::answering(Ok(vec![three_point_route()]));
        let session = session(directions, config());
        session.on_location_update(start_position());
        requested(session.start()).await.unwrap();
        let before = session.current_view();

        let moved = coordinate(3.9, 6.5501);
        session.on_location_update(moved);
        let after = session.current_view();
        assert_eq!(after.state, before.state);
        assert_eq!(after.route, before.route);
        assert_eq!(after.generation, before.generation);
        assert_eq!(after.origin, before.origin);
        assert_eq!(after.position, Some(moved));
        assert!(after.progress.unwrap().remaining_km < before.progress.unwrap().remaining_km);
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let directions = ScriptedDirections::gated(Ok(vec![three_point_route()]));
        let session = session(directions.clone(), config());
        let mut views = session.subscribe();
        session.on_location_update(start_position());

        let _fetch = requested(session.start());
        assert_eq!(
            views.borrow_and_update().state,
            SessionState::RequestingRoute
        );

        directions.release();
        let view = views
            .wait_for(|view| view.state == SessionState::Active)
            .await
            .unwrap()
            .clone();
        assert!(view.route.is_some());

        session.stop();
        assert_eq!(views.borrow_and_update().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn stale_result_sends_no_notice() {
        let directions = ScriptedDirections::gated(Err(ApiError::Other("offline".to_owned())));
        let session = session(directions.clone(), config());
        let mut notices = session.subscribe_notices();
        session.on_location_update(start_position());

        let fetch = requested(session.start());
        session.stop();
        directions.release();

        assert!(matches!(fetch.await.unwrap(), Resolution::Stale(_)));
        assert!(matches!(
            notices.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn request_on_shut_down_runtime_returns_to_idle() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let handle = runtime.handle().clone();
        drop(runtime);

        let directions = ScriptedDirections::answering(Ok(vec![three_point_route()]));
        let session = NavigationSession::new(config(), directions.clone(), handle);
        let mut notices = session.subscribe_notices();
        session.on_location_update(start_position());

        drop(requested(session.start()));
        let view = session.current_view();
        assert_eq!(view.state, SessionState::Idle);
        assert!(view.route.is_none());
        assert_eq!(directions.calls(), 0);

        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.generation, 1);
        assert!(matches!(
            notice.error,
            NavigationError::RouteUnavailable(RouteUnavailableReason::Cancelled)
        ));
    }
}
