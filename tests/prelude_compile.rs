//! Compile-time prelude coverage test.
use pacelimit::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tower::service_fn;
use tower_layer::Layer;
use tower_service::Service;

#[tokio::test]
async fn prelude_reexports_core_types() {
    let clock: Arc<dyn Clock> = Arc::new(VirtualClock::new());
    let limiter: Limiter = LimiterBuilder::new(2).build().expect("valid config");
    let _range = PauseRange::fixed(Duration::from_millis(1));
    let _config = LimiterConfig::new(1).with_min_pause(Duration::ZERO);
    let _paced = Limiter::new(1, Duration::from_millis(1), Some(clock)).expect("valid config");
    let _err: Option<LimiterError> = None;
    let _cfg_err: Option<ConfigError> = None;
    let _system = SystemClock;

    let permit: Option<Permit> = limiter.try_permit();
    drop(permit);

    let mut svc = LimitLayer::new(limiter.clone())
        .layer(service_fn(|_req: ()| async { Ok::<_, std::io::Error>(()) }));
    let _: &LimitService<_> = &svc;
    futures::future::poll_fn(|cx| svc.poll_ready(cx)).await.expect("ready");
    svc.call(()).await.expect("service call failed");
    assert_eq!(limiter.outstanding(), 0);
}
