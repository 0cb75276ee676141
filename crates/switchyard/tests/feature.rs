//! Feature engine behavior, alone and wired through a binder.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use switchyard::feature::FeatureBuilder;
use switchyard::source::{empty, from_future, from_stream, just, of, SharedSource};
use switchyard::{Binder, Connection, Feature, ManualLifecycle, PublishSource, Sink, Source};
use switchyard_testing::{wait_until, TestSink};

// ============================================================================
// Fixtures
// ============================================================================

/// Even wishes produce one effect, odd wishes produce `n` and `n + 1`.
fn digits_actor(_: &String, n: &u32) -> anyhow::Result<SharedSource<u32>> {
    Ok(if n % 2 == 0 { just(*n) } else { of([*n, n + 1]) })
}

fn append(state: &String, effect: &u32) -> String {
    format!("{state}{effect}")
}

fn parse(wish: &'static str) -> u32 {
    wish.parse().unwrap_or_default()
}

fn even_news(_: &String, _: &u32, effect: &u32, _: &String) -> Option<u32> {
    (effect % 2 == 0).then_some(*effect)
}

fn digits() -> Feature<&'static str, String, u32> {
    FeatureBuilder::new(String::new(), digits_actor, append)
        .wish_to_action(parse)
        .news_publisher(even_news)
        .name("digits")
        .build()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn subscribe_states<W: 'static, N: 'static>(feature: &Feature<W, String, N>) -> TestSink<String> {
    let sink = TestSink::new();
    let _subscription = feature.subscribe(sink.sink());
    sink
}

// ============================================================================
// State and news
// ============================================================================

#[test]
fn test_subscriber_gets_initial_state_on_connect() {
    let feature = digits();
    subscribe_states(&feature).assert_values(&strings(&[""]));
}

#[test]
fn test_state_per_effect() {
    let feature = digits();
    let states = subscribe_states(&feature);

    feature.accept("0").unwrap();
    feature.accept("1").unwrap();

    states.assert_values(&strings(&["", "0", "01", "012"]));
}

#[test]
fn test_news_per_qualifying_transition() {
    let feature = digits();
    let news = TestSink::new();
    let _subscription = feature.news().subscribe(news.sink());

    feature.accept("0").unwrap();
    feature.accept("1").unwrap();

    news.assert_values(&[0, 2]);
}

#[test]
fn test_late_news_subscriber_sees_no_past_news() {
    let feature = digits();
    feature.accept("0").unwrap();

    let news = TestSink::new();
    let _subscription = feature.news().subscribe(news.sink());
    feature.accept("1").unwrap();

    news.assert_values(&[2]);
}

#[test]
fn test_cancel_stops_state_and_news() {
    let feature = digits();
    let states = subscribe_states(&feature);
    let news = TestSink::new();
    let _subscription = feature.news().subscribe(news.sink());

    feature.accept("0").unwrap();
    feature.cancel();
    feature.accept("1").unwrap();

    states.assert_values(&strings(&["", "0"]));
    news.assert_values(&[0]);
    assert!(feature.is_cancelled());
}

#[test]
fn test_actor_snapshot_is_taken_at_accept_time() {
    let effects = PublishSource::<u32>::new();
    let snapshots = TestSink::new();
    let feature = {
        let effects = effects.clone();
        let snapshots = snapshots.sink();
        FeatureBuilder::new(
            String::new(),
            move |state: &String, _: &()| {
                snapshots.accept(state.clone());
                anyhow::Ok(effects.shared())
            },
            append,
        )
        .build()
    };

    feature.accept(()).unwrap();
    effects.accept(1);
    feature.accept(()).unwrap();

    snapshots.assert_values(&strings(&["", "1"]));
    assert_eq!(feature.state(), "1");
}

// ============================================================================
// Failure isolation
// ============================================================================

fn crashing() -> Feature<&'static str, String> {
    FeatureBuilder::new(
        String::new(),
        |_: &String, n: &u32| -> anyhow::Result<SharedSource<u32>> {
            if n % 2 == 0 {
                Ok(just(*n))
            } else {
                bail!("wish {n} is odd")
            }
        },
        append,
    )
    .wish_to_action(parse)
    .build()
}

#[test]
fn test_crashing_wish_surfaces_error_and_feature_keeps_working() {
    let feature = crashing();
    let states = subscribe_states(&feature);

    let err = feature.accept("1").unwrap_err();
    assert_eq!(err.as_label(), "feature_actor_failed");
    assert!(err.actor_error().to_string().contains("odd"));

    feature.accept("0").unwrap();

    states.assert_values(&strings(&["", "0"]));
}

#[test]
fn test_wish_sink_logs_rejections_instead_of_failing() {
    let feature = crashing();
    let wishes = feature.wish_sink();
    wishes.accept("1");
    wishes.accept("2");
    assert_eq!(feature.state(), "2");
}

// ============================================================================
// Bootstrapper and post-processor
// ============================================================================

#[test]
fn test_bootstrapper_effects_precede_wishes() {
    let feature = FeatureBuilder::new(String::new(), digits_actor, append)
        .wish_to_action(parse)
        .bootstrapper(|| just(0u32))
        .build();
    let states = subscribe_states(&feature);
    feature.accept("2").unwrap();

    states.assert_values(&strings(&["0", "02"]));
}

#[test]
fn test_post_processor_chains_actions_until_it_stops() {
    let feature = FeatureBuilder::new(String::new(), digits_actor, append)
        .post_processor(|_: &u32, effect: &u32, state: &String| {
            (state.len() < 4).then_some(effect + 2)
        })
        .build();

    feature.accept(0).unwrap();

    assert_eq!(feature.state(), "0246");
}

#[test]
fn test_reducer_only_feature() {
    let feature = Feature::reducer_only(Vec::<char>::new(), |state: &Vec<char>, c: &char| {
        let mut next = state.clone();
        next.push(*c);
        next
    });
    let wishes = feature.wish_sink();
    "abc".chars().for_each(|c| wishes.accept(c));
    assert_eq!(feature.state(), vec!['a', 'b', 'c']);
}

#[test]
fn test_empty_effect_stream_is_not_a_transition() {
    let feature = FeatureBuilder::new(0u8, |_: &u8, _: &u8| anyhow::Ok(empty::<u8>()), |s: &u8, e: &u8| s + e)
        .news_publisher(|_: &u8, _: &u8, e: &u8, _: &u8| Some(*e))
        .build();
    let news = TestSink::new();
    let _subscription = feature.news().subscribe(news.sink());

    feature.accept(1).unwrap();

    news.assert_no_values();
    assert_eq!(feature.state(), 0);
}

// ============================================================================
// Asynchronous effects
// ============================================================================

#[tokio::test]
async fn test_async_effects_are_applied_when_they_complete() {
    let feature = FeatureBuilder::new(
        0u32,
        |_: &u32, n: &u32| {
            let n = *n;
            anyhow::Ok(from_future(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                n
            }))
        },
        |s: &u32, e: &u32| s + e,
    )
    .build();

    feature.accept(4).unwrap();
    assert_eq!(feature.state(), 0);

    let watched = feature.clone();
    assert!(wait_until(Duration::from_secs(2), move || watched.state() == 4).await);
}

#[tokio::test]
async fn test_cancel_discards_pending_async_effects() {
    let produced = Arc::new(AtomicUsize::new(0));
    let feature = {
        let produced = Arc::clone(&produced);
        FeatureBuilder::new(
            0u32,
            move |_: &u32, _: &()| {
                let produced = Arc::clone(&produced);
                let ticks = futures::stream::unfold(0u32, move |n| {
                    let produced = Arc::clone(&produced);
                    async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        produced.fetch_add(1, Ordering::SeqCst);
                        Some((1u32, n + 1))
                    }
                });
                anyhow::Ok(from_stream(ticks))
            },
            |s: &u32, e: &u32| s + e,
        )
        .build()
    };

    feature.accept(()).unwrap();
    let watched = feature.clone();
    assert!(wait_until(Duration::from_secs(2), move || watched.state() >= 1).await);
    feature.cancel();
    let frozen = feature.state();
    let produced_at_cancel = produced.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(feature.state(), frozen);
    // At most one tick was already past its sleep when the task was aborted.
    assert!(produced.load(Ordering::SeqCst) <= produced_at_cancel + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_async_effects_publish_states_in_order() {
    const WISHES: u32 = 2_000;
    let feature = FeatureBuilder::new(
        0u32,
        |_: &u32, _: &()| anyhow::Ok(from_future(async { 1u32 })),
        |s: &u32, e: &u32| s + e,
    )
    .build();

    let states = TestSink::new();
    let _subscription = {
        let record = states.sink();
        feature.subscribe(Sink::new(move |state: u32| {
            // Slow subscriber widens the window for overlapping publications.
            for _ in 0..200 {
                std::hint::spin_loop();
            }
            record.accept(state);
        }))
    };

    for _ in 0..WISHES {
        feature.accept(()).unwrap();
    }

    let (watched, seen) = (feature.clone(), states.clone());
    assert!(
        wait_until(Duration::from_secs(10), move || {
            watched.state() == WISHES && seen.last() == Some(WISHES)
        })
        .await
    );

    let values = states.values();
    assert!(values.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(values, (0..=WISHES).collect::<Vec<_>>());
    assert_eq!(states.last(), Some(feature.state()));
}

#[test]
fn test_state_reentering_feature_from_subscriber_is_applied_in_order() {
    let feature = Feature::reducer_only(0u32, |s: &u32, e: &u32| s + e);
    let states = TestSink::new();
    let _subscription = {
        let record = states.sink();
        let wishes = feature.wish_sink();
        feature.subscribe(Sink::new(move |state: u32| {
            record.accept(state);
            if (1..3).contains(&state) {
                wishes.accept(1);
            }
        }))
    };

    feature.accept(1).unwrap();

    states.assert_values(&[0, 1, 2, 3]);
}

// ============================================================================
// Feature inside a binder
// ============================================================================

#[test]
fn test_feature_wired_through_lifecycle_binder() {
    let lifecycle = ManualLifecycle::new();
    let feature = digits();
    let clicks = PublishSource::<&'static str>::new();
    let ui = TestSink::new();

    let binder = Binder::with_lifecycle_init(lifecycle.clone(), |binder| {
        binder.bind(Connection::new(clicks.clone(), feature.clone()))?;
        binder.bind(Connection::new(feature.clone(), ui.sink()).named("render"))
    })
    .unwrap();

    clicks.accept("1");
    lifecycle.begin();
    clicks.accept("0");
    lifecycle.end();
    clicks.accept("2");

    ui.assert_values(&strings(&["", "0"]));
    assert_eq!(feature.state(), "0");
    binder.cancel();
}
