//! Streaming synthesis integration tests
//!
//! Runs the whole pipeline against a sine-wave voice backend

use std::sync::Arc;

use charvoice::audio::{WAV_HEADER_SIZE, bytes_to_float, wav};
use charvoice::effects::{DspCapabilities, StageKind};
use charvoice::synthesis::{STREAM_BUFFER_FRAMES, split_wav};
use charvoice::{Error, SynthesisRequest};
use futures::StreamExt;

mod common;
use common::{BLOCK, BLOCKS, EndlessLoader, SineLoader, service, voices_dir};

/// Header + one frame per block + one flush frame
const EXPECTED_PCM_BYTES: usize = (BLOCKS + 1) * BLOCK * 2;

#[tokio::test]
async fn test_stream_with_preset() {
    let dir = voices_dir();
    let loader = Arc::new(SineLoader::default());
    let service = service(dir.path(), Arc::<SineLoader>::clone(&loader), DspCapabilities::full(), 2);

    let request = SynthesisRequest::new("hello", "en-test").with_preset("robot");
    let stream = service.open_stream(request).await.unwrap();
    assert_eq!(stream.sample_rate(), 22_050);
    assert_eq!(stream.voice(), "en-test");

    let bytes = stream.collect().await;
    let (info, pcm) = split_wav(&bytes).unwrap();

    assert_eq!(info.sample_rate, 22_050);
    assert_eq!(info.channels, 1);
    assert_eq!(info.bits_per_sample, 16);
    assert_eq!(pcm.len(), EXPECTED_PCM_BYTES);

    let samples = bytes_to_float(pcm).unwrap();
    let peak = samples.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
    assert!(peak <= 1.0, "peak {peak}");
    assert!(peak > 0.01, "robot preset should not silence the voice");
    assert_eq!(loader.loads(), 1);
}

#[tokio::test]
async fn test_unknown_preset_streams_unprocessed() {
    let dir = voices_dir();
    let service = service(dir.path(), Arc::new(SineLoader::default()), DspCapabilities::full(), 2);

    let request = SynthesisRequest::new("hello", "en-test").with_preset("dragon");
    let bytes = service.open_stream(request).await.unwrap().collect().await;
    let (_, pcm) = split_wav(&bytes).unwrap();

    let expected: Vec<i16> = common::sine(220.0, BLOCK, 22_050, 0.5)
        .into_iter()
        .map(charvoice::audio::float_to_i16)
        .collect();
    assert_eq!(&pcm[..BLOCK * 2], charvoice::audio::i16_to_bytes(&expected).as_slice());
    // The flush frame of an empty chain is silence
    assert!(pcm[BLOCKS * BLOCK * 2..].iter().all(|&b| b == 0));
}

#[tokio::test]
async fn test_sample_rate_follows_sidecar() {
    let dir = voices_dir();
    let service = service(dir.path(), Arc::new(SineLoader::default()), DspCapabilities::full(), 2);

    let stream = service
        .open_stream(SynthesisRequest::new("hallo", "de-low"))
        .await
        .unwrap();
    assert_eq!(stream.sample_rate(), 16_000);
    let bytes = stream.collect().await;
    assert_eq!(wav::parse_header(&bytes).unwrap().sample_rate, 16_000);
}

#[tokio::test]
async fn test_default_voice_is_used_when_none_given() {
    let dir = voices_dir();
    let service = service(dir.path(), Arc::new(SineLoader::default()), DspCapabilities::full(), 2);

    let stream = service.open_stream(SynthesisRequest::new("hi", "")).await.unwrap();
    assert_eq!(stream.voice(), "en-test");
}

#[tokio::test]
async fn test_empty_text_is_rejected_before_streaming() {
    let dir = voices_dir();
    let loader = Arc::new(SineLoader::default());
    let service = service(dir.path(), Arc::<SineLoader>::clone(&loader), DspCapabilities::full(), 2);

    let result = service.open_stream(SynthesisRequest::new("   ", "en-test")).await;
    assert!(matches!(result, Err(Error::Config(_))));
    assert_eq!(loader.loads(), 0);
}

#[tokio::test]
async fn test_missing_voice_is_configuration_missing() {
    let dir = voices_dir();
    let service = service(dir.path(), Arc::new(SineLoader::default()), DspCapabilities::full(), 2);

    let result = service.open_stream(SynthesisRequest::new("hi", "fr-absent")).await;
    assert!(matches!(result, Err(Error::ConfigurationMissing(_))));
}

#[tokio::test]
async fn test_preset_without_dsp_is_configuration_missing() {
    let dir = voices_dir();
    let service = service(dir.path(), Arc::new(SineLoader::default()), DspCapabilities::absent(), 2);

    let preset = SynthesisRequest::new("hi", "en-test").with_preset("wizard");
    assert!(matches!(
        service.open_stream(preset).await,
        Err(Error::ConfigurationMissing(_))
    ));

    // Unprocessed streams need no DSP
    let plain = SynthesisRequest::new("hi", "en-test");
    assert!(service.open_stream(plain).await.is_ok());
}

#[tokio::test]
async fn test_disabled_stage_passes_audio_through() {
    let dir = voices_dir();
    let caps = DspCapabilities::full().without([StageKind::Reverb, StageKind::PitchShift]);
    let service = service(dir.path(), Arc::new(SineLoader::default()), caps, 2);

    let request = SynthesisRequest::new("hi", "en-test").with_preset("wizard");
    let bytes = service.open_stream(request).await.unwrap().collect().await;
    assert_eq!(bytes.len(), WAV_HEADER_SIZE + EXPECTED_PCM_BYTES);
}

#[tokio::test]
async fn test_upstream_failure_truncates_stream() {
    let dir = voices_dir();
    let loader = Arc::new(SineLoader {
        fail_after: Some(1),
        ..SineLoader::default()
    });
    let service = service(dir.path(), loader, DspCapabilities::full(), 2);

    let bytes = service
        .open_stream(SynthesisRequest::new("hello", "en-test"))
        .await
        .unwrap()
        .collect()
        .await;

    // Header and the one good block; no flush after a failure
    assert_eq!(bytes.len(), WAV_HEADER_SIZE + BLOCK * 2);
}

#[tokio::test]
async fn test_stream_frames_arrive_in_order() {
    let dir = voices_dir();
    let service = service(dir.path(), Arc::new(SineLoader::default()), DspCapabilities::full(), 2);

    let stream = service
        .open_stream(SynthesisRequest::new("hello", "en-test").with_preset("fairy"))
        .await
        .unwrap();
    let frames: Vec<Vec<u8>> = stream
        .into_stream()
        .map(|frame| frame.unwrap())
        .collect()
        .await;

    assert_eq!(frames.len(), 1 + BLOCKS + 1);
    assert_eq!(frames[0].len(), WAV_HEADER_SIZE);
    assert!(frames[1..].iter().all(|f| f.len() == BLOCK * 2));
}

#[tokio::test]
async fn test_voices_are_cached_between_streams() {
    let dir = voices_dir();
    let loader = Arc::new(SineLoader::default());
    let service = service(dir.path(), Arc::<SineLoader>::clone(&loader), DspCapabilities::full(), 1);

    for voice in ["en-test", "en-test", "de-low", "en-test"] {
        let stream = service
            .open_stream(SynthesisRequest::new("hi", voice))
            .await
            .unwrap();
        stream.collect().await;
    }

    // Capacity one: en-test, hit, de-low evicts it, en-test reloads
    assert_eq!(loader.loads(), 3);
    assert_eq!(service.voices().resident_ids().await, vec!["en-test".to_string()]);
}

#[tokio::test]
async fn test_render_to_file() {
    let dir = voices_dir();
    let service = service(dir.path(), Arc::new(SineLoader::default()), DspCapabilities::full(), 2);
    let out = dir.path().join("out.wav");

    let summary = service
        .render_to_file(
            SynthesisRequest::new("hello", "en-test").with_preset("goblin"),
            &out,
        )
        .await
        .unwrap();
    assert_eq!(summary.sample_rate, 22_050);
    assert_eq!(summary.pcm_bytes, EXPECTED_PCM_BYTES);

    let reader = hound::WavReader::open(&out).unwrap();
    assert_eq!(reader.spec().sample_rate, 22_050);
    assert_eq!(reader.len() as usize, EXPECTED_PCM_BYTES / 2);
}

#[tokio::test]
async fn test_render_fails_on_upstream_error() {
    let dir = voices_dir();
    let loader = Arc::new(SineLoader {
        fail_after: Some(2),
        ..SineLoader::default()
    });
    let service = service(dir.path(), loader, DspCapabilities::full(), 2);
    let out = dir.path().join("broken.wav");

    let result = service
        .render_to_file(SynthesisRequest::new("hello", "en-test"), &out)
        .await;
    assert!(matches!(result, Err(Error::Synthesis(_))));
    assert!(!out.exists());
}

#[test]
fn test_stream_outside_async_context() {
    let dir = voices_dir();
    let service = service(dir.path(), Arc::new(SineLoader::default()), DspCapabilities::full(), 2);

    let bytes = tokio_test::block_on(async {
        let stream = service
            .open_stream(SynthesisRequest::new("hello", "en-test").with_preset("fairy"))
            .await
            .unwrap();
        stream.collect().await
    });
    assert_eq!(bytes.len(), WAV_HEADER_SIZE + EXPECTED_PCM_BYTES);
}

#[tokio::test]
async fn test_dropped_stream_stops_synthesis() {
    let dir = voices_dir();
    let loader = Arc::new(EndlessLoader::default());
    let service = service(dir.path(), Arc::<EndlessLoader>::clone(&loader), DspCapabilities::full(), 2);

    let mut frames = Box::pin(
        service
            .open_stream(SynthesisRequest::new("never ending", "en-test"))
            .await
            .unwrap()
            .into_stream(),
    );
    let header = frames.next().await.unwrap().unwrap();
    assert_eq!(header.len(), WAV_HEADER_SIZE);

    // Backpressure holds the producer once the channel is full
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let bound = STREAM_BUFFER_FRAMES + 2;
    assert!(loader.pulls() <= bound, "pulled {} blocks", loader.pulls());
    assert!(loader.holders() >= 2);

    drop(frames);

    // The session lets go of the voice; only the cache keeps it
    let mut waited = 0;
    while loader.holders() > 1 && waited < 200 {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        waited += 1;
    }
    assert_eq!(loader.holders(), 1);

    let stopped_at = loader.pulls();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(loader.pulls(), stopped_at);
    assert!(stopped_at <= bound, "pulled {stopped_at} blocks");
}
