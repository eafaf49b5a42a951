use std::path::Path;

use crate::{
    ffmpeg::FfMpegError,
    process::fake::{FakeRunner, Probe, Remux},
};

use super::{classify_orientation, parse_orientation, FfProbeStreams, Orientation};

fn orientation_tests() -> [(&'static str, Option<Orientation>); 5] {
    [
        ("landscape_with_audio", Some(Orientation::Landscape)),
        ("portrait_video_only", Some(Orientation::Portrait)),
        ("square", Some(Orientation::Other)),
        ("audio_only", None),
        ("picture_in_picture", Some(Orientation::Landscape)),
    ]
}

fn read_fixture(case: &str) -> String {
    std::fs::read_to_string(format!("./src/discover/ffprobe_6_0_{case}_streams.json"))
        .expect("Read file")
}

#[test]
fn parse_streams() {
    for (case, expected) in orientation_tests() {
        let json: FfProbeStreams = serde_json::from_str(&read_fixture(case)).expect("Valid json");

        let output = parse_orientation(json.streams);

        assert_eq!(output, expected, "{case}");
    }
}

#[test]
fn dimensions() {
    assert_eq!(
        Orientation::from_dimensions(1920, 1080),
        Orientation::Landscape
    );
    assert_eq!(
        Orientation::from_dimensions(1080, 1920),
        Orientation::Portrait
    );
    assert_eq!(Orientation::from_dimensions(512, 512), Orientation::Other);
    assert_eq!(Orientation::from_dimensions(0, 0), Orientation::Other);
    assert_eq!(Orientation::from_dimensions(2, 1), Orientation::Landscape);
    assert_eq!(Orientation::from_dimensions(1, 2), Orientation::Portrait);
}

#[test]
fn first_video_stream_wins() {
    let json = r#"{"streams": [
        {"codec_type": "audio"},
        {"codec_type": "video", "width": 100, "height": 400},
        {"codec_type": "video", "width": 4000, "height": 100},
        {"codec_type": "video", "width": 300, "height": 300}
    ]}"#;

    let streams: FfProbeStreams = serde_json::from_str(json).expect("Valid json");

    assert_eq!(
        parse_orientation(streams.streams),
        Some(Orientation::Portrait)
    );
}

#[test]
fn empty_streams_are_unclassified() {
    let streams: FfProbeStreams = serde_json::from_str(r#"{"streams": []}"#).expect("Valid json");
    assert_eq!(parse_orientation(streams.streams), None);

    let streams: FfProbeStreams = serde_json::from_str("{}").expect("Valid json");
    assert_eq!(parse_orientation(streams.streams), None);
}

#[test]
fn rendering() {
    assert_eq!(Orientation::Landscape.to_string(), "landscape");
    assert_eq!(Orientation::Portrait.to_string(), "portrait");
    assert_eq!(Orientation::Other.to_string(), "other");
}

#[tokio::test]
async fn classifies_through_ffprobe() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("video.mp4");
    std::fs::write(&path, b"video").expect("write");

    let runner = FakeRunner::probing(&read_fixture("portrait_video_only"));

    let orientation = classify_orientation(&runner, &path)
        .await
        .expect("Classified");

    assert_eq!(orientation, Some(Orientation::Portrait));
    assert_eq!(runner.calls(), vec!["ffprobe"]);
}

#[tokio::test]
async fn malformed_output_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("video.mp4");
    std::fs::write(&path, b"video").expect("write");

    let runner = FakeRunner::probing(r#"{"streams": [{"codec_type": "video", "width": "wide"#);

    let res = classify_orientation(&runner, &path).await;

    assert!(matches!(res, Err(FfMpegError::Json(_))));
}

#[tokio::test]
async fn probe_failure_is_an_error() {
    let runner = FakeRunner::new(Remux::Copy, Probe::Fail);

    let res = classify_orientation(&runner, Path::new("/does/not/matter.mp4")).await;

    assert!(matches!(res, Err(FfMpegError::Probe(_))));
}
