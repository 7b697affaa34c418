//! Encoder process configuration

/// Default encoder frame rate
pub const DEFAULT_FRAME_RATE: u32 = 10;

/// How the external encoder is invoked
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Program to run
    pub program: String,

    /// Output frame rate
    pub frame_rate: u32,

    /// Explicit argument list, replacing the built-in MJPEG → fragmented MP4 one
    pub custom_args: Option<Vec<String>>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            frame_rate: DEFAULT_FRAME_RATE,
            custom_args: None,
        }
    }
}

impl EncoderConfig {
    /// Run `program` with exactly `args`
    pub fn custom<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            frame_rate: DEFAULT_FRAME_RATE,
            custom_args: Some(args.into_iter().map(Into::into).collect()),
        }
    }

    /// Set the encoder program
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the output frame rate, at least 1
    pub fn frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = fps.max(1);
        self
    }

    /// Command line arguments for the encoder
    ///
    /// Input is motion JPEG on stdin with wall-clock timestamps, resampled to a
    /// constant frame rate and paced in real time. Output is fragmented MP4 with
    /// an empty initial `moov` so it can be streamed without seeking.
    pub fn args(&self) -> Vec<String> {
        if let Some(args) = &self.custom_args {
            return args.clone();
        }

        let fps = self.frame_rate.to_string();
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "mjpeg",
            "-use_wallclock_as_timestamps",
            "1",
            "-re",
            "-i",
            "pipe:0",
            "-vsync",
            "cfr",
            "-r",
            &fps,
            "-f",
            "mp4",
            "-g",
            "2",
            "-crf",
            "23",
            "-tune",
            "zerolatency",
            "-preset",
            "ultrafast",
            "-movflags",
            "frag_keyframe+empty_moov",
            "-pix_fmt",
            "yuvj420p",
            "pipe:1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}
