use std::sync::Arc;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use pcmstream_extras::StreamSettings;
use pcmstream_format::encode_samples;
use pcmstream_sdk::{
    BufferingCallback, BufferingEvent, PcmFormat, SampleEncoding, StreamConfig,
    StreamingBuffer, VirtualEngine,
};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Read the WAV file into raw little-endian bytes in a matching stream encoding.
fn load_wav(
    path: &std::path::Path,
) -> Result<(PcmFormat, Vec<u8>), Box<dyn std::error::Error>> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();

    let (encoding, bytes) = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => {
            let samples = reader.into_samples::<i16>().collect::<Result<Vec<_>, _>>()?;
            let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
            (SampleEncoding::S16Le, bytes)
        }
        (SampleFormat::Int, 32) => {
            let samples = reader.into_samples::<i32>().collect::<Result<Vec<_>, _>>()?;
            let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
            (SampleEncoding::S32Le, bytes)
        }
        (SampleFormat::Float, 32) => {
            let samples = reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>()?;
            (SampleEncoding::Float32, encode_samples(&samples, SampleEncoding::Float32))
        }
        (format, bits) => {
            return Err(format!("Unsupported WAV sample format: {:?} {} bits", format, bits).into())
        }
    };

    let format = PcmFormat::new(spec.sample_rate, spec.channels, encoding);
    info!(
        "WAV file loaded: {} Hz, {} channels, {} bits/sample, {} bytes",
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
        bytes.len()
    );
    Ok((format, bytes))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let settings = StreamSettings::load(&args)?;
    let (Some(input), Some(output)) = (settings.input.clone(), settings.output_path()) else {
        return Err("Usage: wav_stream <input.wav> [output.wav]".into());
    };

    info!("Input: {:?}, output: {:?}", input, output);
    let (format, bytes) = load_wav(&input)?;

    let engine = Arc::new(VirtualEngine::new(usize::from(format.channels)));
    let config = StreamConfig::new(format)
        .with_max_buffer_size(settings.max_buffer_bytes)
        .with_pre_buffer(settings.pre_buffer());

    let on_buffering: BufferingCallback = Box::new(|event: BufferingEvent| match event {
        BufferingEvent::Started { handle, buffered } => {
            warn!("Voice {} starved at {:.3}s, buffering", handle, buffered);
        }
        BufferingEvent::Ended { handle, buffered } => {
            info!("Voice {} resumed with {:.3}s decoded", handle, buffered);
        }
    });
    let mut stream = StreamingBuffer::configure(config, engine.clone(), Some(on_buffering))?;

    let handle = engine.allocate_handle();
    let reader = stream.attach(handle);
    engine.play_with(handle, reader, false);

    let bytes_per_second = format.frame_size() * format.sample_rate as usize;
    let mut feed = interval(settings.feed_period(bytes_per_second));
    let mut tick = interval(settings.tick_period(format.sample_rate));
    feed.set_missed_tick_behavior(MissedTickBehavior::Burst);
    tick.set_missed_tick_behavior(MissedTickBehavior::Burst);

    let mut chunks = bytes.chunks(settings.chunk_bytes);
    let mut out = vec![0.0f32; settings.tick_frames * engine.channels()];
    let mut rendered = Vec::with_capacity(bytes.len() / usize::from(format.encoding.width()));
    let mut pushes = 0usize;

    loop {
        tokio::select! {
            _ = feed.tick(), if !stream.is_ended() => {
                match chunks.next() {
                    Some(chunk) => {
                        pushes += 1;
                        match stream.push_data(chunk) {
                            Ok(()) => {}
                            Err(e) if e.is_terminal() => {
                                warn!("Stream closed at push {}, playing out what is buffered: {}", pushes, e);
                            }
                            Err(e) => warn!("Push {} failed: {}", pushes, e),
                        }
                    }
                    None => {
                        if let Err(e) = stream.mark_ended() {
                            warn!("Final flush failed: {}", e);
                        }
                    }
                }
            }
            _ = tick.tick() => {
                let frames = out.len() / engine.channels();
                engine.mix(frames, &mut out);
                rendered.extend_from_slice(&out);
                if engine.voice_count() == 0 {
                    break;
                }
            }
        }
    }

    info!(
        "Stream finished: {} pushes, {:.3}s decoded, {:.3}s rendered",
        pushes,
        stream.current_buffered_duration(),
        format.duration_of(rendered.len())
    );

    let spec = WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&output, spec)?;
    for sample in rendered {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    info!("Wrote {:?}", output);

    Ok(())
}
