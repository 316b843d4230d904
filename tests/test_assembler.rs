mod common;
use common::*;

use bms_bridge::jbd::assembler::FrameAssembler as JbdAssembler;
use bms_bridge::jk::assembler::{FrameAssembler as JkAssembler, ReadState};
use bms_bridge::prelude::*;
use bms_bridge::{jbd, jk, RawFrame};

use futures::StreamExt;
use tokio_util::codec::FramedRead;

fn feed_jk(assembler: &mut JkAssembler, bytes: &[u8]) -> Vec<RawFrame> {
    bytes.iter().filter_map(|&b| assembler.push(b)).collect()
}

fn feed_jbd(assembler: &mut JbdAssembler, bytes: &[u8]) -> Vec<RawFrame> {
    bytes.iter().filter_map(|&b| assembler.push(b)).collect()
}

#[test]
fn jk_resyncs_after_corrupted_marker() {
    let valid = jk_response(&jk_sample_section());

    let mut stream = vec![0x00, 0x13, 0x4e, 0x00, 0x57];
    // second marker byte lost on the wire
    stream.extend_from_slice(&[0x4e, 0x12, 0x34]);
    stream.extend_from_slice(&valid);

    let mut assembler = JkAssembler::new();
    let frames = feed_jk(&mut assembler, &stream);

    assert_eq!(frames, vec![valid]);
    assert_eq!(jk::message::validate(&frames[0]), Ok(()));
    assert!(assembler.is_idle());
}

#[test]
fn jk_frames_back_to_back() {
    let first = jk_response(&[0x85, 0x50]);
    let second = jk_response(&[0x85, 0x51]);

    let mut stream = first.clone();
    stream.extend_from_slice(&second);

    let mut assembler = JkAssembler::new();
    assert_eq!(feed_jk(&mut assembler, &stream), vec![first, second]);
}

#[test]
fn jk_waits_for_response_after_request() {
    let mut assembler = JkAssembler::new();
    assembler.expect_response();
    assert_eq!(assembler.state(), ReadState::WaitingForFrameStart);
    assert!(!assembler.is_idle());

    // noise while waiting does not end the wait
    feed_jk(&mut assembler, &[0x01, 0x02]);
    assert_eq!(assembler.state(), ReadState::WaitingForFrameStart);

    let frames = feed_jk(&mut assembler, &jk_response(&[0x85, 0x50]));
    assert_eq!(frames.len(), 1);
    assert!(assembler.is_idle());
}

#[test]
fn jbd_resyncs_after_bad_end_marker() {
    let mut broken = jbd_response(0x04, &[0x0c, 0xfb]);
    let last = broken.len() - 1;
    broken[last] = 0x00;

    let valid = jbd_response(0x04, &[0x0c, 0xfb, 0x0c, 0xfc]);

    let mut stream = broken;
    stream.extend_from_slice(&valid);

    let mut assembler = JbdAssembler::new();
    let frames = feed_jbd(&mut assembler, &stream);

    assert_eq!(frames, vec![valid]);
    assert_eq!(jbd::message::validate(&frames[0]), Ok(()));
}

#[test]
fn jbd_frame_without_data() {
    let frame = jbd_response(0xe1, &[]);
    let mut assembler = JbdAssembler::new();
    assert_eq!(feed_jbd(&mut assembler, &frame), vec![frame]);
}

#[tokio::test]
async fn jk_decoder_frames_async_stream() -> Result<()> {
    let first = jk_response(&jk_sample_section());
    let second = jk_response(&[0x85, 0x50]);

    let mut bytes = vec![0xff, 0x4e];
    bytes.extend_from_slice(&first);
    bytes.extend_from_slice(&second);

    let mut framed = FramedRead::new(&bytes[..], JkAssembler::new());

    assert_eq!(framed.next().await.transpose()?, Some(first));
    assert_eq!(framed.next().await.transpose()?, Some(second));
    assert_eq!(framed.next().await.transpose()?, None);
    Ok(())
}

#[tokio::test]
async fn jbd_decoder_frames_async_stream() -> Result<()> {
    let info = jbd_response(0x03, &jbd_basic_information());
    let cells = jbd_response(0x04, &[0x0c, 0xfb]);

    let mut bytes = info.clone();
    bytes.extend_from_slice(&cells);

    let frames: Vec<RawFrame> = FramedRead::new(&bytes[..], JbdAssembler::new())
        .map(|frame| frame.unwrap())
        .collect()
        .await;

    assert_eq!(frames, vec![info, cells]);
    Ok(())
}
