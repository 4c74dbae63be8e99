// Offline song rendering: every audible hit is placed at its absolute frame,
// then trimmed sample copies are mixed into fixed-length buffers. Nothing here
// reads the clock, so the same inputs always produce the same frames.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use log::{debug, info, warn};

use crate::audio::{SampleBuffer, SampleCache, StereoFrame, Voice};
use crate::config::RenderSettings;
use crate::error::RenderError;
use crate::pipeline::{Channel, SongScene};
use crate::sequencer::dispatch::resolve;
use crate::sequencer::timing::{step_duration_ms, swing_offset_ms, triplet_duration_ms};
use crate::sequencer::ChannelSnapshot;
use crate::shared::{triplet_count, ChannelId, PunchIn, Timeline};

pub const MIX_LABEL: &str = "mix";

// Rendered buffers keyed by label: `"mix"`, or a channel's label per stem.
pub type Renders = BTreeMap<String, Vec<StereoFrame>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    Mix,
    Stems,
    Stem(ChannelId),
}

// A channel's sample, trimmed once and reused for every hit.
struct Prepared {
    buffer: SampleBuffer,
    gain: f32,
    rate: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Hit {
    frame: usize,
    channel_id: ChannelId,
    semitones: f32,
}

// Total length of the scenes, without the tail.
pub fn song_duration_seconds(scenes: &[SongScene]) -> f64 {
    scenes.iter().map(SongScene::duration_seconds).sum()
}

pub fn render_song(
    scenes: &[SongScene],
    channels: &[Channel],
    mode: RenderMode,
    settings: &RenderSettings,
    cache: &SampleCache,
) -> Result<Renders, RenderError> {
    if scenes.is_empty() {
        return Err(RenderError::EmptySong);
    }
    let seconds = song_duration_seconds(scenes) + settings.tail_seconds.max(0.0);
    if seconds > settings.max_song_seconds {
        return Err(RenderError::TooLong { seconds, limit: settings.max_song_seconds });
    }

    let targets: Vec<&Channel> = match mode {
        RenderMode::Mix => channels.iter().collect(),
        RenderMode::Stems => channels.iter().filter(|c| c.sample.is_some()).collect(),
        RenderMode::Stem(id) => {
            let ch = channels
                .iter()
                .find(|c| c.id == id)
                .ok_or(RenderError::UnknownChannel(id))?;
            if ch.sample.is_none() {
                return Err(RenderError::NoSample(id));
            }
            vec![ch]
        }
    };

    let mut prepared = HashMap::new();
    for ch in &targets {
        match prepare(ch, cache) {
            Ok(Some(p)) => {
                prepared.insert(ch.id, p);
            }
            Ok(None) => {}
            Err(e) if matches!(mode, RenderMode::Stem(_)) => return Err(e),
            Err(e) => warn!("{}: {e}, rendering it silent", ch.label()),
        }
    }

    let total_frames = (seconds * settings.sample_rate as f64).round() as usize;
    let hits = collect_hits(scenes, channels, &prepared, settings.sample_rate);
    info!(
        "rendering {} scene(s), {} hit(s), {total_frames} frames ({mode:?})",
        scenes.len(),
        hits.len()
    );

    let mut renders = Renders::new();
    match mode {
        RenderMode::Mix => {
            let mut out = vec![StereoFrame::zero(); total_frames];
            for hit in &hits {
                place(&mut out, hit, &prepared, settings.sample_rate);
            }
            renders.insert(MIX_LABEL.to_string(), out);
        }
        RenderMode::Stems | RenderMode::Stem(_) => {
            let mut used = HashSet::new();
            for ch in &targets {
                let mut out = vec![StereoFrame::zero(); total_frames];
                for hit in hits.iter().filter(|h| h.channel_id == ch.id) {
                    place(&mut out, hit, &prepared, settings.sample_rate);
                }
                renders.insert(unique_label(&mut used, ch), out);
            }
        }
    }
    debug!("rendered {} buffer(s)", renders.len());
    Ok(renders)
}

// Channel names are free text, so a `-{id}` suffix can collide with a real name too.
fn unique_label(used: &mut HashSet<String>, ch: &Channel) -> String {
    let base = ch.label();
    let mut label = base.clone();
    let mut n = 1;
    while !used.insert(label.clone()) {
        label = if n == 1 { format!("{base}-{}", ch.id) } else { format!("{base}-{}-{n}", ch.id) };
        n += 1;
    }
    label
}

fn prepare(ch: &Channel, cache: &SampleCache) -> Result<Option<Prepared>, RenderError> {
    let Some(sample) = ch.sample.as_ref() else {
        return Ok(None);
    };
    let decoded = cache.load_wav(Path::new(&sample.source))?;
    Ok(Some(Prepared {
        buffer: decoded.trimmed(sample.trim_start_ms, sample.trim_end_ms),
        gain: ch.combined_volume(),
        rate: sample.playback_rate as f64,
    }))
}

// Every audible hit of the song, in time order per scene.
fn collect_hits(
    scenes: &[SongScene],
    channels: &[Channel],
    prepared: &HashMap<ChannelId, Prepared>,
    sample_rate: u32,
) -> Vec<Hit> {
    let sr = sample_rate as f64;
    let mut hits = Vec::new();
    let mut offset_ms = 0.0;

    for scene in scenes {
        let snapshots: Vec<ChannelSnapshot> = channels
            .iter()
            .map(|ch| {
                let pattern = scene.pattern_for(ch.id);
                ChannelSnapshot {
                    channel_id: ch.id,
                    steps: pattern.steps.clone(),
                    triplet_steps: pattern.triplet_steps.clone(),
                    muted: ch.muted,
                    solo: ch.solo,
                    has_sample: prepared.contains_key(&ch.id),
                }
            })
            .collect();

        let step_ms = step_duration_ms(scene.bpm);
        for idx in 0..scene.step_count {
            let at = offset_ms + idx as f64 * step_ms + swing_offset_ms(idx, scene.swing, step_ms);
            for fired in resolve(&snapshots, Timeline::Straight, idx, PunchIn::None) {
                hits.push(Hit {
                    frame: (at / 1000.0 * sr).round() as usize,
                    channel_id: fired.channel_id,
                    semitones: scene.pattern_for(fired.channel_id).pitch(idx),
                });
            }
        }

        let triplet_ms = triplet_duration_ms(scene.bpm);
        for idx in 0..triplet_count(scene.step_count) {
            let at = offset_ms + idx as f64 * triplet_ms;
            for fired in resolve(&snapshots, Timeline::Triplet, idx, PunchIn::None) {
                hits.push(Hit {
                    frame: (at / 1000.0 * sr).round() as usize,
                    channel_id: fired.channel_id,
                    semitones: 0.0,
                });
            }
        }

        offset_ms += scene.duration_seconds() * 1000.0;
    }
    hits
}

fn place(out: &mut [StereoFrame], hit: &Hit, prepared: &HashMap<ChannelId, Prepared>, sample_rate: u32) {
    let Some(p) = prepared.get(&hit.channel_id) else {
        return;
    };
    if hit.frame >= out.len() {
        return;
    }
    let pitch = 2f64.powf(hit.semitones as f64 / 12.0);
    let step = p.rate * pitch * p.buffer.sample_rate as f64 / sample_rate as f64;
    let mut voice = Voice::whole(&p.buffer, step, p.gain);
    voice.render_into(&p.buffer, &mut out[hit.frame..]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Pattern, Sample};
    use crate::shared::SceneId;

    const SR: u32 = 1000;

    fn settings() -> RenderSettings {
        RenderSettings { sample_rate: SR, tail_seconds: 0.5, max_song_seconds: 60.0 }
    }

    // one frame of 1.0 so each hit shows up as a single spike
    fn cache_with_click(key: &str) -> SampleCache {
        let cache = SampleCache::new(SR);
        cache.insert(key, SampleBuffer::from_mono(&[1.0], SR));
        cache
    }

    fn channel(id: u32, source: Option<&str>) -> Channel {
        let mut ch = Channel::new(ChannelId(id), 16);
        ch.volume = 1.0;
        ch.sample = source.map(|s| Sample::new(s, 1.0));
        ch
    }

    fn scene(bpm: f64, steps: &[(u32, &[usize])]) -> SongScene {
        let mut s = SongScene::new(SceneId(0), "a", bpm, 16, 0.0);
        for (id, hits) in steps {
            let mut p = Pattern::new(16);
            for &i in *hits {
                p.toggle_step(i);
            }
            s.patterns.insert(ChannelId(*id), p);
        }
        s
    }

    fn spikes(buf: &[StereoFrame]) -> Vec<usize> {
        buf.iter().enumerate().filter(|(_, f)| f.left != 0.0).map(|(i, _)| i).collect()
    }

    #[test]
    fn test_empty_song_is_an_error() {
        let cache = SampleCache::new(SR);
        let err = render_song(&[], &[], RenderMode::Mix, &settings(), &cache).unwrap_err();
        assert!(matches!(err, RenderError::EmptySong));
    }

    #[test]
    fn test_too_long_is_an_error() {
        let cache = SampleCache::new(SR);
        let mut s = settings();
        s.max_song_seconds = 1.0;
        let err = render_song(&[scene(120.0, &[])], &[], RenderMode::Mix, &s, &cache).unwrap_err();
        assert!(matches!(err, RenderError::TooLong { .. }));
    }

    #[test]
    fn test_mix_places_hits_on_the_grid() {
        let cache = cache_with_click("click");
        let chans = vec![channel(0, Some("click"))];
        let song = [scene(120.0, &[(0, &[0, 4, 8, 12])])];
        let out = render_song(&song, &chans, RenderMode::Mix, &settings(), &cache).unwrap();
        let mix = &out[MIX_LABEL];
        assert_eq!(mix.len(), 2500); // 2s of scene plus 0.5s tail
        assert_eq!(spikes(mix), vec![0, 500, 1000, 1500]);
    }

    #[test]
    fn test_swing_delays_offbeats_offline() {
        let cache = cache_with_click("click");
        let chans = vec![channel(0, Some("click"))];
        let mut s = scene(120.0, &[(0, &[0, 1])]);
        s.swing = 100.0;
        let out = render_song(&[s], &chans, RenderMode::Mix, &settings(), &cache).unwrap();
        // step 1 at 125ms plus 0.75 * 125ms
        assert_eq!(spikes(&out[MIX_LABEL]), vec![0, 219]);
    }

    #[test]
    fn test_second_scene_starts_after_first() {
        let cache = cache_with_click("click");
        let chans = vec![channel(0, Some("click"))];
        let song = [scene(120.0, &[(0, &[0])]), scene(240.0, &[(0, &[1])])];
        let out = render_song(&song, &chans, RenderMode::Mix, &settings(), &cache).unwrap();
        assert_eq!(spikes(&out[MIX_LABEL]), vec![0, 2000 + 63]);
    }

    #[test]
    fn test_muted_and_soloed_channels_offline() {
        let cache = cache_with_click("click");
        let mut chans = vec![channel(0, Some("click")), channel(1, Some("click"))];
        let song = [scene(120.0, &[(0, &[0]), (1, &[1])])];

        chans[0].muted = true;
        let out = render_song(&song, &chans, RenderMode::Mix, &settings(), &cache).unwrap();
        assert_eq!(spikes(&out[MIX_LABEL]), vec![125]);

        chans[0].muted = false;
        chans[0].solo = true;
        let out = render_song(&song, &chans, RenderMode::Mix, &settings(), &cache).unwrap();
        assert_eq!(spikes(&out[MIX_LABEL]), vec![0]);
    }

    #[test]
    fn test_stems_split_by_channel() {
        let cache = cache_with_click("click");
        let chans = vec![channel(0, Some("click")), channel(1, Some("click")), channel(2, None)];
        let song = [scene(120.0, &[(0, &[0]), (1, &[2])])];
        let out = render_song(&song, &chans, RenderMode::Stems, &settings(), &cache).unwrap();
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["ch1", "ch2"]);
        assert_eq!(spikes(&out["ch1"]), vec![0]);
        assert_eq!(spikes(&out["ch2"]), vec![250]);
    }

    #[test]
    fn test_stem_errors() {
        let cache = cache_with_click("click");
        let chans = vec![channel(0, None)];
        let song = [scene(120.0, &[])];
        let s = settings();
        assert!(matches!(
            render_song(&song, &chans, RenderMode::Stem(ChannelId(9)), &s, &cache),
            Err(RenderError::UnknownChannel(ChannelId(9)))
        ));
        assert!(matches!(
            render_song(&song, &chans, RenderMode::Stem(ChannelId(0)), &s, &cache),
            Err(RenderError::NoSample(ChannelId(0)))
        ));
    }

    #[test]
    fn test_failed_decode_is_silent_in_mix() {
        let cache = SampleCache::new(SR);
        let chans = vec![channel(0, Some("/no/such/file.wav"))];
        let song = [scene(120.0, &[(0, &[0])])];
        let out = render_song(&song, &chans, RenderMode::Mix, &settings(), &cache).unwrap();
        assert!(spikes(&out[MIX_LABEL]).is_empty());
        assert!(render_song(&song, &chans, RenderMode::Stem(ChannelId(0)), &settings(), &cache).is_err());
    }

    #[test]
    fn test_duplicate_labels_get_suffixed() {
        let cache = cache_with_click("click");
        let mut chans = vec![channel(0, Some("click")), channel(1, Some("click"))];
        chans[0].name = "drums".into();
        chans[1].name = "drums".into();
        let out = render_song(&[scene(120.0, &[])], &chans, RenderMode::Stems, &settings(), &cache).unwrap();
        assert!(out.contains_key("drums"));
        assert!(out.contains_key("drums-1"));
    }

    #[test]
    fn test_suffixed_label_never_replaces_a_real_name() {
        let cache = cache_with_click("click");
        let mut chans = vec![
            channel(0, Some("click")),
            channel(1, Some("click")),
            channel(2, Some("click")),
        ];
        chans[0].name = "drums".into();
        chans[1].name = "drums".into();
        chans[2].name = "drums-1".into();
        let song = [scene(120.0, &[(2, &[4])])];
        let out = render_song(&song, &chans, RenderMode::Stems, &settings(), &cache).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["drums", "drums-1", "drums-1-2"]);
        // channel 2's hit survives under its fallback label
        assert_eq!(spikes(&out["drums-1-2"]), vec![500]);
    }
}
