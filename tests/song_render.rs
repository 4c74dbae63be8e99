use beatgrid::audio::{SampleBuffer, SampleCache, StereoFrame};
use beatgrid::config::RenderSettings;
use beatgrid::pipeline::{Channel, Pattern, Sample, SongScene};
use beatgrid::render::{export_wavs, render_song, song_duration_seconds, RenderMode, MIX_LABEL};
use beatgrid::shared::{ChannelId, SceneId, SAMPLE_RATE};

// A decaying 440Hz blip, deterministic and long enough to overlap hits.
fn blip(freq: f32) -> SampleBuffer {
    let samples: Vec<f32> = (0..4410)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            (std::f32::consts::TAU * freq * t).sin() * (1.0 - i as f32 / 4410.0)
        })
        .collect();
    SampleBuffer::from_mono(&samples, SAMPLE_RATE)
}

fn fixture() -> (Vec<SongScene>, Vec<Channel>, SampleCache) {
    let cache = SampleCache::new(SAMPLE_RATE);
    let mut channels = Vec::new();
    for id in 0..4u32 {
        let key = format!("ch{id}.wav");
        cache.insert(key.clone(), blip(220.0 * (id + 1) as f32));
        let mut ch = Channel::new(ChannelId(id), 16);
        let mut sample = Sample::new(key, 100.0);
        sample.set_trim(5.0, 80.0);
        ch.sample = Some(sample);
        channels.push(ch);
    }

    let mut a = SongScene::new(SceneId(0), "verse", 120.0, 16, 30.0);
    let mut b = SongScene::new(SceneId(1), "chorus", 100.0, 32, 0.0);
    for id in 0..4u32 {
        let mut pa = Pattern::new(16);
        let mut pb = Pattern::new(32);
        for i in (id as usize..16).step_by(4) {
            pa.toggle_step(i);
        }
        for i in (0..48).step_by(5 + id as usize) {
            pb.toggle_triplet(i);
        }
        pb.toggle_step(id as usize * 3);
        pb.set_pitch(id as usize * 3, 7.0);
        a.patterns.insert(ChannelId(id), pa);
        b.patterns.insert(ChannelId(id), pb);
    }
    (vec![a, b], channels, cache)
}

fn is_silent(frames: &[StereoFrame]) -> bool {
    frames.iter().all(|f| f.left == 0.0 && f.right == 0.0)
}

#[test]
fn test_render_is_bit_identical_across_runs() {
    let (scenes, channels, cache) = fixture();
    let settings = RenderSettings::default();

    let first = render_song(&scenes, &channels, RenderMode::Mix, &settings, &cache).unwrap();
    let second = render_song(&scenes, &channels, RenderMode::Mix, &settings, &cache).unwrap();

    let (a, b) = (&first[MIX_LABEL], &second[MIX_LABEL]);
    assert_eq!(a.len(), b.len());
    assert!(a.iter().zip(b).all(|(x, y)| x.left.to_bits() == y.left.to_bits()
        && x.right.to_bits() == y.right.to_bits()));
    assert!(!is_silent(a));
}

#[test]
fn test_stem_renders_only_its_channel_for_the_whole_song() {
    let (scenes, channels, cache) = fixture();
    let settings = RenderSettings::default();

    let stems = render_song(&scenes, &channels, RenderMode::Stem(ChannelId(3)), &settings, &cache).unwrap();
    assert_eq!(stems.len(), 1);
    let stem = &stems["ch4"];

    let seconds = song_duration_seconds(&scenes) + settings.tail_seconds;
    assert_eq!(stem.len(), (seconds * SAMPLE_RATE as f64).round() as usize);

    // channel 3 starts on step 3 of the first scene, an offbeat pushed back by 30% swing
    let swung_ms = 3.0 * 125.0 + 0.3 * 0.75 * 125.0;
    let first_hit = (swung_ms / 1000.0 * SAMPLE_RATE as f64).round() as usize;
    assert!(is_silent(&stem[..first_hit]));
    assert!(!is_silent(&stem[first_hit..first_hit + 100]));

    // other channels' mute state does not change the stem
    let mut muted_others = channels.clone();
    for ch in muted_others.iter_mut().filter(|c| c.id != ChannelId(3)) {
        ch.muted = true;
    }
    let again = render_song(&scenes, &muted_others, RenderMode::Stem(ChannelId(3)), &settings, &cache).unwrap();
    assert_eq!(&again["ch4"], stem);
}

#[test]
fn test_soloed_channel_silences_other_stems() {
    let (scenes, mut channels, cache) = fixture();
    channels[1].solo = true;
    let stems = render_song(&scenes, &channels, RenderMode::Stems, &RenderSettings::default(), &cache).unwrap();
    assert_eq!(stems.len(), 4);
    assert!(!is_silent(&stems["ch2"]));
    assert!(is_silent(&stems["ch1"]));
    assert!(is_silent(&stems["ch3"]));
}

#[test]
fn test_mix_export_round_trips_through_wav() {
    let (scenes, channels, cache) = fixture();
    let settings = RenderSettings::default();
    let renders = render_song(&scenes, &channels, RenderMode::Mix, &settings, &cache).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let paths = export_wavs(dir.path(), &renders, settings.sample_rate).unwrap();
    assert_eq!(paths, vec![dir.path().join("mix.wav")]);

    let reader = hound::WavReader::open(&paths[0]).unwrap();
    let spec = reader.spec();
    assert_eq!((spec.channels, spec.sample_rate, spec.bits_per_sample), (2, SAMPLE_RATE, 16));
    assert_eq!(reader.duration() as usize, renders[MIX_LABEL].len());
}
