//! Ordered emission and concurrency ceiling of the synthesis dispatcher.

mod mock_providers;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use mock_providers::{LatencySynth, Stall, StallingSink, audio_order, audio_texts, drain};
use waav_agent::core::dispatcher::{DispatchOutcome, SynthesisDispatcher, synthesis_slots};
use waav_agent::core::sentence::Sentence;
use waav_agent::core::sink::ChannelSink;

const SENTENCES: [&str; 5] = ["One.", "Two.", "Three.", "Four.", "Five."];

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn synth_with(latencies: &[u64]) -> LatencySynth {
    SENTENCES
        .iter()
        .zip(latencies)
        .fold(LatencySynth::new(ms(10)), |synth, (text, latency)| {
            synth.with_latency(text, ms(*latency))
        })
}

#[tokio::test(start_paused = true)]
async fn test_order_holds_for_any_latency_and_ceiling() {
    let patterns: [[u64; 5]; 4] = [
        [500, 400, 300, 200, 100],
        [100, 200, 300, 400, 500],
        [300, 10, 300, 10, 300],
        [50, 50, 50, 50, 50],
    ];

    for latencies in patterns {
        for k in 1..=4 {
            let synth = Arc::new(synth_with(&latencies));
            let (sink, mut rx) = ChannelSink::new();
            let dispatcher = SynthesisDispatcher::with_concurrency(
                1,
                synth.clone(),
                k,
                Arc::new(sink),
                CancellationToken::new(),
            );

            for (seq, text) in SENTENCES.iter().enumerate() {
                dispatcher.submit(Sentence::new(seq as u64, *text));
            }
            dispatcher.finish();

            let outcome = dispatcher.wait().await;
            assert_eq!(
                outcome,
                DispatchOutcome::Completed {
                    emitted: 5,
                    failed: 0
                },
                "latencies {latencies:?}, k {k}"
            );

            let events = drain(&mut rx);
            let seqs: Vec<u64> = audio_order(&events).into_iter().map(|(_, seq)| seq).collect();
            assert_eq!(seqs, vec![0, 1, 2, 3, 4], "latencies {latencies:?}, k {k}");

            let texts: Vec<Option<String>> =
                SENTENCES.iter().map(|t| Some(t.to_string())).collect();
            assert_eq!(audio_texts(&events), texts);

            assert!(synth.max_in_flight() <= k, "ceiling exceeded for k {k}");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_parallelism_shortens_wall_time() {
    let latencies = [200, 200, 200, 200];

    let start = tokio::time::Instant::now();
    let synth = Arc::new(synth_with(&latencies));
    let (sink, _rx) = ChannelSink::new();
    let dispatcher = SynthesisDispatcher::with_concurrency(
        1,
        synth.clone(),
        4,
        Arc::new(sink),
        CancellationToken::new(),
    );
    for (seq, text) in SENTENCES.iter().take(4).enumerate() {
        dispatcher.submit(Sentence::new(seq as u64, *text));
    }
    dispatcher.finish();
    dispatcher.wait().await;

    // Four 200ms calls overlapped instead of running back to back
    assert!(start.elapsed() < ms(400));
    assert_eq!(synth.max_in_flight(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_sentences_arriving_while_calls_in_flight() {
    let synth = Arc::new(synth_with(&[300, 20, 20, 20, 20]));
    let (sink, mut rx) = ChannelSink::new();
    let dispatcher = SynthesisDispatcher::with_concurrency(
        9,
        synth.clone(),
        2,
        Arc::new(sink),
        CancellationToken::new(),
    );

    for (seq, text) in SENTENCES.iter().enumerate() {
        dispatcher.submit(Sentence::new(seq as u64, *text));
        tokio::time::sleep(ms(40)).await;
    }
    dispatcher.finish();
    dispatcher.wait().await;

    let order = audio_order(&drain(&mut rx));
    assert_eq!(order, vec![(9, 0), (9, 1), (9, 2), (9, 3), (9, 4)]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_sentence_keeps_its_place() {
    let synth = Arc::new(
        LatencySynth::new(ms(50))
            .with_latency("One.", ms(200))
            .failing_on("Two."),
    );
    let (sink, mut rx) = ChannelSink::new();
    let dispatcher = SynthesisDispatcher::with_concurrency(
        1,
        synth,
        3,
        Arc::new(sink),
        CancellationToken::new(),
    );

    for (seq, text) in SENTENCES.iter().take(3).enumerate() {
        dispatcher.submit(Sentence::new(seq as u64, *text));
    }
    dispatcher.finish();

    assert_eq!(
        dispatcher.wait().await,
        DispatchOutcome::Completed {
            emitted: 3,
            failed: 1
        }
    );
    assert_eq!(
        audio_texts(&drain(&mut rx)),
        vec![Some("One.".to_string()), None, Some("Three.".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_emission() {
    let synth = Arc::new(LatencySynth::new(ms(100)));
    let (sink, mut rx) = ChannelSink::new();
    let cancel = CancellationToken::new();
    let dispatcher =
        SynthesisDispatcher::with_concurrency(1, synth.clone(), 1, Arc::new(sink), cancel.clone());

    for (seq, text) in SENTENCES.iter().enumerate() {
        dispatcher.submit(Sentence::new(seq as u64, *text));
    }
    dispatcher.finish();

    // First sentence emitted, second in flight
    tokio::time::sleep(ms(150)).await;
    cancel.cancel();

    assert_eq!(dispatcher.wait().await, DispatchOutcome::Cancelled);

    tokio::time::sleep(ms(1000)).await;
    let order = audio_order(&drain(&mut rx));
    assert_eq!(order, vec![(1, 0)]);
    // Queued sentences were never sent to the provider
    assert!(synth.calls().len() <= 2);
}

#[tokio::test(start_paused = true)]
async fn test_shared_pool_caps_across_dispatchers() {
    let synth = Arc::new(LatencySynth::new(ms(100)));
    let slots = synthesis_slots(2);

    let (sink_a, mut rx_a) = ChannelSink::new();
    let (sink_b, mut rx_b) = ChannelSink::new();
    let a = SynthesisDispatcher::spawn(
        1,
        synth.clone(),
        slots.clone(),
        Arc::new(sink_a),
        CancellationToken::new(),
    );
    let b = SynthesisDispatcher::spawn(
        2,
        synth.clone(),
        slots.clone(),
        Arc::new(sink_b),
        CancellationToken::new(),
    );

    for (seq, text) in SENTENCES.iter().enumerate() {
        a.submit(Sentence::new(seq as u64, *text));
        b.submit(Sentence::new(seq as u64, *text));
    }
    a.finish();
    b.finish();

    let (outcome_a, outcome_b) = tokio::join!(a.wait(), b.wait());
    assert!(matches!(outcome_a, DispatchOutcome::Completed { emitted: 5, .. }));
    assert!(matches!(outcome_b, DispatchOutcome::Completed { emitted: 5, .. }));
    assert!(synth.max_in_flight() <= 2);

    let expected: Vec<u64> = (0..5).collect();
    let seqs_a: Vec<u64> = audio_order(&drain(&mut rx_a)).into_iter().map(|(_, s)| s).collect();
    let seqs_b: Vec<u64> = audio_order(&drain(&mut rx_b)).into_iter().map(|(_, s)| s).collect();
    assert_eq!(seqs_a, expected);
    assert_eq!(seqs_b, expected);
    assert_eq!(slots.available_permits(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_call_becomes_failed_sentence() {
    let synth = Arc::new(LatencySynth::new(ms(20)).panicking_on("Two."));
    let (sink, mut rx) = ChannelSink::new();
    let dispatcher = SynthesisDispatcher::with_concurrency(
        1,
        synth.clone(),
        1,
        Arc::new(sink),
        CancellationToken::new(),
    );

    for (seq, text) in SENTENCES.iter().take(3).enumerate() {
        dispatcher.submit(Sentence::new(seq as u64, *text));
    }
    dispatcher.finish();

    let outcome = tokio::time::timeout(Duration::from_secs(5), dispatcher.wait())
        .await
        .expect("dispatcher hung after a panicking call");
    assert_eq!(
        outcome,
        DispatchOutcome::Completed {
            emitted: 3,
            failed: 1
        }
    );
    assert_eq!(
        audio_texts(&drain(&mut rx)),
        vec![Some("One.".to_string()), None, Some("Three.".to_string())]
    );
    // The panicking call still released its slot
    assert_eq!(synth.calls(), vec!["One.", "Two.", "Three."]);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_stalled_emission() {
    let synth = Arc::new(LatencySynth::new(ms(10)));
    let (sink, mut rx) = StallingSink::new(Stall::SentenceAudio);
    let cancel = CancellationToken::new();
    let dispatcher =
        SynthesisDispatcher::with_concurrency(1, synth, 2, Arc::new(sink), cancel.clone());

    dispatcher.submit(Sentence::new(0, "One."));
    dispatcher.submit(Sentence::new(1, "Two."));
    dispatcher.finish();

    // Both results are in; the driver is blocked handing over the first
    tokio::time::sleep(ms(100)).await;
    cancel.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(1), dispatcher.wait())
        .await
        .expect("cancel did not interrupt a stalled sink");
    assert_eq!(outcome, DispatchOutcome::Cancelled);
    assert!(audio_order(&drain(&mut rx)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_waiting_dispatcher_keeps_its_place_for_a_slot() {
    let synth = Arc::new(LatencySynth::new(ms(100)));
    let slots = synthesis_slots(1);
    let held = slots.clone().acquire_owned().await.unwrap();

    let (sink_a, mut rx_a) = ChannelSink::new();
    let (sink_b, _rx_b) = ChannelSink::new();
    let a = SynthesisDispatcher::spawn(
        1,
        synth.clone(),
        slots.clone(),
        Arc::new(sink_a),
        CancellationToken::new(),
    );
    let b = SynthesisDispatcher::spawn(
        2,
        synth.clone(),
        slots.clone(),
        Arc::new(sink_b),
        CancellationToken::new(),
    );

    // A queues for the slot before B does
    a.submit(Sentence::new(0, "Alpha one."));
    tokio::time::sleep(ms(10)).await;
    b.submit(Sentence::new(0, "Bravo one."));
    tokio::time::sleep(ms(10)).await;

    // New work for A while it waits must not send it to the back
    a.submit(Sentence::new(1, "Alpha two."));
    tokio::time::sleep(ms(10)).await;
    drop(held);

    a.finish();
    b.finish();
    let (outcome_a, outcome_b) = tokio::join!(a.wait(), b.wait());
    assert!(matches!(outcome_a, DispatchOutcome::Completed { emitted: 2, .. }));
    assert!(matches!(outcome_b, DispatchOutcome::Completed { emitted: 1, .. }));

    assert_eq!(synth.calls(), vec!["Alpha one.", "Bravo one.", "Alpha two."]);
    assert_eq!(audio_order(&drain(&mut rx_a)), vec![(1, 0), (1, 1)]);
    assert_eq!(slots.available_permits(), 1);
}
