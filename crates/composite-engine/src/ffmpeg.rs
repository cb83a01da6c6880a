//! ffmpeg child-process plumbing.
//!
//! Video frames cross process boundaries as raw RGB24 over pipes and
//! audio as raw s16le PCM, so the engine keeps full control of the pixel
//! math while ffmpeg handles containers and codecs. Child stderr is
//! drained on a helper thread so a chatty process can never stall on a
//! full pipe.

use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use chromix_common::error::{EngineError, EngineResult};
use chromix_processing_core::audio::{CHANNELS, SAMPLE_RATE};
use chromix_processing_core::frame::FrameBuffer;

use crate::accel::EncoderSelection;

/// Verify the external tools respond before any frame is touched.
pub fn verify_tools(ffmpeg: &str, ffprobe: &str) -> EngineResult<()> {
    for tool in [ffmpeg, ffprobe] {
        let status = Command::new(tool)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(s) if s.success() => {}
            _ => {
                return Err(EngineError::tooling(format!(
                    "`{tool}` is not available; install FFmpeg or point CHROMIX_FFMPEG/CHROMIX_FFPROBE at it"
                )));
            }
        }
    }
    Ok(())
}

/// Arguments for decoding a video stream to raw RGB24 on stdout.
///
/// `fps` rate-conforms the output (used to align the foreground to the
/// background clock); `limit_secs` stops decoding past the active window.
pub fn decode_video_args(path: &Path, fps: Option<f64>, limit_secs: Option<f64>) -> Vec<String> {
    let mut args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-nostdin".to_string(),
        "-i".to_string(),
        path.display().to_string(),
    ];
    if let Some(limit) = limit_secs {
        args.push("-t".to_string());
        args.push(format!("{limit:.6}"));
    }
    if let Some(fps) = fps {
        args.push("-r".to_string());
        args.push(format!("{fps:.6}"));
    }
    args.extend([
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "pipe:1".to_string(),
    ]);
    args
}

/// Arguments for encoding raw RGB24 frames from stdin into `dest`.
pub fn encode_video_args(
    dest: &Path,
    width: u32,
    height: u32,
    fps: f64,
    selection: &EncoderSelection,
) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "-s".to_string(),
        format!("{width}x{height}"),
        "-r".to_string(),
        format!("{fps:.6}"),
        "-i".to_string(),
        "pipe:0".to_string(),
        "-an".to_string(),
        "-c:v".to_string(),
        selection.codec.clone(),
    ];
    if let Some(preset) = &selection.preset {
        args.push("-preset".to_string());
        args.push(preset.clone());
    }
    args.extend([
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        dest.display().to_string(),
    ]);
    args
}

/// Arguments for decoding a file's audio to raw s16le PCM on stdout at
/// the engine rate.
pub fn decode_audio_args(path: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-nostdin".to_string(),
        "-i".to_string(),
        path.display().to_string(),
        "-vn".to_string(),
        "-f".to_string(),
        "s16le".to_string(),
        "-acodec".to_string(),
        "pcm_s16le".to_string(),
        "-ac".to_string(),
        CHANNELS.to_string(),
        "-ar".to_string(),
        SAMPLE_RATE.to_string(),
        "pipe:1".to_string(),
    ]
}

/// Arguments for muxing the encoded video with a raw PCM track into the
/// final container (video copied, audio encoded as AAC).
pub fn mux_args(video: &Path, pcm: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-i".to_string(),
        video.display().to_string(),
        "-f".to_string(),
        "s16le".to_string(),
        "-ar".to_string(),
        SAMPLE_RATE.to_string(),
        "-ac".to_string(),
        CHANNELS.to_string(),
        "-i".to_string(),
        pcm.display().to_string(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "1:a:0".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-shortest".to_string(),
        output.display().to_string(),
    ]
}

/// Streaming decoder: one ffmpeg child emitting fixed-size RGB24 frames.
pub struct FrameDecoder {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    frame_len: usize,
}

impl FrameDecoder {
    pub fn spawn(
        ffmpeg: &str,
        path: &Path,
        width: u32,
        height: u32,
        fps: Option<f64>,
        limit_secs: Option<f64>,
    ) -> EngineResult<Self> {
        let args = decode_video_args(path, fps, limit_secs);
        tracing::debug!(?args, "Spawning ffmpeg decoder");
        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::tooling(format!("failed to start ffmpeg decoder: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::tooling("failed to capture decoder stdout"))?;
        let stderr = child.stderr.take().map(spawn_stderr_drain);

        Ok(Self {
            child,
            stdout,
            stderr,
            frame_len: width as usize * height as usize * 3,
        })
    }

    /// Read the next frame into `frame`. Returns `Ok(false)` on a clean
    /// end of stream; a mid-frame EOF is an error.
    pub fn read_frame(&mut self, frame: &mut FrameBuffer) -> io::Result<bool> {
        debug_assert_eq!(frame.data.len(), self.frame_len);
        read_exact_or_eof(&mut self.stdout, &mut frame.data)
    }

    /// Stop the child and collect its stderr for diagnostics.
    pub fn finish(mut self) -> String {
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for FrameDecoder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Streaming encoder: one ffmpeg child consuming RGB24 frames on stdin.
pub struct FrameEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
}

impl FrameEncoder {
    pub fn spawn(
        ffmpeg: &str,
        dest: &Path,
        width: u32,
        height: u32,
        fps: f64,
        selection: &EncoderSelection,
    ) -> EngineResult<Self> {
        let args = encode_video_args(dest, width, height, fps, selection);
        tracing::debug!(?args, "Spawning ffmpeg encoder");
        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::tooling(format!("failed to start ffmpeg encoder: {e}")))?;

        let stdin = child.stdin.take();
        if stdin.is_none() {
            return Err(EngineError::tooling("failed to capture encoder stdin"));
        }
        let stderr = child.stderr.take().map(spawn_stderr_drain);

        Ok(Self {
            child,
            stdin,
            stderr,
        })
    }

    pub fn write_frame(&mut self, frame: &FrameBuffer) -> io::Result<()> {
        match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(&frame.data),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "encoder stdin already closed",
            )),
        }
    }

    /// Close stdin, wait for the encoder to flush, and report failure
    /// with its stderr attached.
    pub fn finish(mut self) -> Result<(), String> {
        drop(self.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|e| format!("failed to wait on encoder: {e}"))?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(format!(
                "ffmpeg encoder exited with {status}: {}",
                stderr.trim()
            ))
        }
    }
}

impl Drop for FrameEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Decode a file's audio track fully into interleaved i16 PCM.
pub fn decode_audio(ffmpeg: &str, path: &Path) -> EngineResult<Vec<i16>> {
    let args = decode_audio_args(path);
    tracing::debug!(?args, "Decoding audio track");
    let output = Command::new(ffmpeg)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| EngineError::tooling(format!("failed to run ffmpeg: {e}")))?;

    if !output.status.success() {
        return Err(EngineError::unsupported_media(
            path,
            format!(
                "audio decode failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }

    Ok(output
        .stdout
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect())
}

/// Mux the encoded video with the mixed PCM track into the final output.
pub fn mux_with_audio(ffmpeg: &str, video: &Path, pcm: &Path, output: &Path) -> io::Result<()> {
    let args = mux_args(video, pcm, output);
    tracing::debug!(?args, "Muxing output");
    let result = Command::new(ffmpeg)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()?;

    if result.status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!(
            "ffmpeg mux exited with {}: {}",
            result.status,
            String::from_utf8_lossy(&result.stderr).trim()
        )))
    }
}

/// Drain a child's stderr to a string on a helper thread.
fn spawn_stderr_drain(stderr: ChildStderr) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut output = String::new();
        match reader.read_to_string(&mut output) {
            Ok(_) => output,
            Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
        }
    })
}

/// Fill `buf` completely or report a clean EOF at a frame boundary.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("truncated frame: got {filled} of {} bytes", buf.len()),
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::EncoderSelection;
    use std::path::PathBuf;

    #[test]
    fn test_decode_args_request_raw_rgb() {
        let args = decode_video_args(&PathBuf::from("in.mp4"), Some(30.0), Some(10.0));
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo"));
        assert!(joined.contains("-pix_fmt rgb24"));
        assert!(joined.contains("-t 10.000000"));
        assert!(joined.contains("-r 30.000000"));
        assert!(joined.ends_with("pipe:1"));
    }

    #[test]
    fn test_decode_args_omit_optional_flags() {
        let args = decode_video_args(&PathBuf::from("in.mp4"), None, None);
        assert!(!args.contains(&"-t".to_string()));
        assert!(!args.contains(&"-r".to_string()));
    }

    #[test]
    fn test_encode_args_shape() {
        let selection = EncoderSelection {
            codec: "libx264".to_string(),
            preset: Some("ultrafast".to_string()),
            hardware: false,
        };
        let args = encode_video_args(&PathBuf::from("tmp.mp4"), 1280, 720, 29.97, &selection);
        let joined = args.join(" ");
        assert!(joined.contains("-s 1280x720"));
        assert!(joined.contains("-i pipe:0"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-preset ultrafast"));
        assert!(joined.contains("-pix_fmt yuv420p"));
    }

    #[test]
    fn test_encode_args_hardware_has_no_preset() {
        let selection = EncoderSelection {
            codec: "h264_nvenc".to_string(),
            preset: None,
            hardware: true,
        };
        let args = encode_video_args(&PathBuf::from("tmp.mp4"), 640, 360, 30.0, &selection);
        assert!(!args.contains(&"-preset".to_string()));
        assert!(args.contains(&"h264_nvenc".to_string()));
    }

    #[test]
    fn test_audio_args_use_engine_rate() {
        let args = decode_audio_args(&PathBuf::from("in.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-f s16le"));
        assert!(joined.contains("-ar 44100"));
        assert!(joined.contains("-ac 2"));
    }

    #[test]
    fn test_mux_args_copy_video_and_encode_audio() {
        let args = mux_args(
            &PathBuf::from("video.mp4"),
            &PathBuf::from("mix.pcm"),
            &PathBuf::from("out.mp4"),
        );
        let joined = args.join(" ");
        assert!(joined.contains("-c:v copy"));
        assert!(joined.contains("-c:a aac"));
        assert!(joined.contains("-map 0:v:0"));
        assert!(joined.contains("-map 1:a:0"));
        assert!(joined.ends_with("out.mp4"));
    }

    #[test]
    fn test_read_exact_or_eof() {
        let data = vec![7u8; 12];
        let mut cursor = std::io::Cursor::new(data);

        let mut buf = vec![0u8; 6];
        assert!(read_exact_or_eof(&mut cursor, &mut buf).unwrap());
        assert!(read_exact_or_eof(&mut cursor, &mut buf).unwrap());
        // Clean EOF at a frame boundary.
        assert!(!read_exact_or_eof(&mut cursor, &mut buf).unwrap());

        // EOF inside a frame is an error.
        let mut cursor = std::io::Cursor::new(vec![7u8; 4]);
        let err = read_exact_or_eof(&mut cursor, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
