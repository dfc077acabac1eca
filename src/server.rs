//! The stdio frame server loop.
//!
//! One request in, one response line out, in order. A bad frame (malformed header,
//! short read, undecodable image, model failure or model panic) is answered with an
//! empty box list. Only I/O failures on the streams themselves stop the loop.

use std::io::{BufRead, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use anyhow::{Context, Result};
use image::DynamicImage;

use crate::convert::detections_to_boxes;
use crate::detect::DetectionResult;
use crate::model::DetectionModel;
use crate::protocol::{
    discard_payload, read_header, read_payload, write_response, BoxRecord, HeaderLine, Payload,
    RequestHeader, Response, MAX_HEADER_BYTES,
};

/// How each decoded frame is run through the model.
#[derive(Debug, Clone)]
pub struct InferencePolicy {
    pub confidence: f32,
    pub imgsz: u32,
    /// Tracker settings file; the built-in tracker is used while it does not exist.
    pub tracker_config: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    pub requests: u64,
    pub answered_empty: u64,
    pub failures: u64,
}

pub struct FrameServer<M> {
    model: M,
    policy: InferencePolicy,
    max_frame_bytes: u64,
}

impl<M: DetectionModel> FrameServer<M> {
    pub fn new(model: M, policy: InferencePolicy, max_frame_bytes: u64) -> Self {
        Self {
            model,
            policy,
            max_frame_bytes,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Serve requests until `input` is exhausted.
    pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, mut output: W) -> Result<ServeStats> {
        let mut stats = ServeStats::default();
        let mut buf = Vec::new();

        while let Some(header) = read_header(&mut input, &mut buf).context("failed to read header")? {
            let line = match header {
                HeaderLine::Line(line) => line,
                HeaderLine::TooLong(skipped) => {
                    log::warn!(
                        "rejecting header: no newline within {} bytes, skipped {}",
                        MAX_HEADER_BYTES,
                        skipped
                    );
                    stats.requests += 1;
                    stats.failures += 1;
                    stats.answered_empty += 1;
                    write_response(&mut output, &Response::empty(None))
                        .context("failed to write response")?;
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            stats.requests += 1;

            let response = match RequestHeader::parse(&line) {
                Ok(header) => self.serve_frame(&mut input, header, &mut stats)?,
                Err(err) => {
                    log::warn!("rejecting header: {}", err);
                    stats.failures += 1;
                    Response::empty(err.client_id().map(str::to_string))
                }
            };
            if response.boxes.is_empty() {
                stats.answered_empty += 1;
            }
            write_response(&mut output, &response).context("failed to write response")?;
        }

        log::info!(
            "input closed after {} requests ({} empty, {} failed)",
            stats.requests,
            stats.answered_empty,
            stats.failures
        );
        Ok(stats)
    }

    fn serve_frame<R: BufRead>(
        &mut self,
        input: &mut R,
        header: RequestHeader,
        stats: &mut ServeStats,
    ) -> Result<Response> {
        let client_id = header.client_id;
        if header.len <= 0 {
            return Ok(Response::empty(client_id));
        }
        let len = header.len as u64;

        if len > self.max_frame_bytes {
            let skipped = discard_payload(input, len).context("failed to skip oversized frame")?;
            log::warn!(
                "client {:?}: frame of {} bytes exceeds limit of {}, skipped {}",
                client_id,
                len,
                self.max_frame_bytes,
                skipped
            );
            stats.failures += 1;
            return Ok(Response::empty(client_id));
        }

        let payload = match read_payload(input, len).context("failed to read frame")? {
            Payload::Complete(bytes) => bytes,
            Payload::Short(got) => {
                log::warn!(
                    "client {:?}: input ended after {} of {} frame bytes",
                    client_id,
                    got,
                    len
                );
                stats.failures += 1;
                return Ok(Response::empty(client_id));
            }
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.process(&payload)));
        let boxes = match outcome {
            Ok(Ok(boxes)) => boxes,
            Ok(Err(err)) => {
                log::warn!("client {:?}: {:#}", client_id, err);
                stats.failures += 1;
                Vec::new()
            }
            Err(_) => {
                log::error!("client {:?}: model panicked, answering empty", client_id);
                stats.failures += 1;
                Vec::new()
            }
        };
        Ok(Response::new(client_id, boxes))
    }

    fn process(&mut self, payload: &[u8]) -> Result<Vec<BoxRecord>> {
        let image = image::load_from_memory(payload).context("failed to decode frame")?;
        let results = match self.track(&image) {
            Ok(results) => results,
            Err(err) => {
                log::warn!("tracking failed, using detection instead: {:#}", err);
                self.model
                    .detect(&image, self.policy.confidence, self.policy.imgsz)
                    .context("detection failed")?
            }
        };
        Ok(detections_to_boxes(&results, self.model.class_names()))
    }

    fn track(&mut self, image: &DynamicImage) -> Result<Vec<DetectionResult>> {
        let config = self.policy.tracker_config.as_path();
        let config = config.is_file().then_some(config);
        self.model
            .track(image, self.policy.confidence, self.policy.imgsz, config)
    }
}
