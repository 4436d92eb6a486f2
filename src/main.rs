use bytes::Bytes;
use encode_bus::{
    encoder::{AudioEncoder, Settings},
    frame::AudioFrame,
};

fn main() -> anyhow::Result<()> {
    env_logger::init();
    encode_bus::init()?;

    let settings = Settings::default();
    let mut encoder = AudioEncoder::new(settings.clone());
    let samples = encoder.configure()?;
    println!(
        "codec {} wants {} samples per frame",
        settings.codec, samples
    );
    encoder.start()?;

    // one second of silence, framed the way the codec asked for
    let format = settings.codec.sample_format();
    let channels = settings.channel_layout.channels() as usize;
    let (plane_count, plane_len) = if format.is_planar() {
        (channels, samples * format.bytes())
    } else {
        (1, samples * format.bytes() * channels)
    };
    let frame_count = (settings.sample_rate as usize / samples) as i64;
    for i in 0..frame_count {
        let planes = (0..plane_count)
            .map(|_| Bytes::from(vec![0u8; plane_len]))
            .collect();
        encoder.send_frame(AudioFrame::new(
            i * samples as i64,
            samples as i64,
            planes,
            format,
            settings.sample_rate,
            settings.channel_layout.layout(),
            settings.channel_layout.channels(),
        ));
    }

    let mut received = 0usize;
    let mut last_data = std::time::Instant::now();
    while last_data.elapsed() < std::time::Duration::from_millis(500) {
        match encoder.try_receive() {
            Some(packet) => {
                received += 1;
                println!("{}", packet);
                last_data = std::time::Instant::now();
            }
            None => std::thread::sleep(std::time::Duration::from_millis(10)),
        }
    }
    println!("received {} packets for {} frames", received, frame_count);

    encoder.stop();
    Ok(())
}
