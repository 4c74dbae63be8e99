use serde::{Deserialize, Serialize};

use super::oscillator::{Lfo, LfoTarget, MultiOscillatorParams, OscillatorLayer, Waveform};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Kick,
    Snare,
    Hihat,
    Clap,
    Bass,
    Lead,
}

impl Preset {
    pub const ALL: [Preset; 6] = [
        Preset::Kick,
        Preset::Snare,
        Preset::Hihat,
        Preset::Clap,
        Preset::Bass,
        Preset::Lead,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Preset::Kick => "kick",
            Preset::Snare => "snare",
            Preset::Hihat => "hihat",
            Preset::Clap => "clap",
            Preset::Bass => "bass",
            Preset::Lead => "lead",
        }
    }

    pub fn from_name(name: &str) -> Option<Preset> {
        Self::ALL.into_iter().find(|p| p.name().eq_ignore_ascii_case(name))
    }

    pub fn params(self) -> MultiOscillatorParams {
        use Waveform::*;
        match self {
            Preset::Kick => MultiOscillatorParams {
                layers: vec![
                    OscillatorLayer::new(Sine, 55.0, 1.0),
                    OscillatorLayer::new(Triangle, 110.0, 0.4),
                ],
                noise: 0.0,
                attack_ms: 1.0,
                decay_ms: 280.0,
                duration_ms: 300.0,
                volume: 1.0,
                lfo: None,
            },
            Preset::Snare => MultiOscillatorParams {
                layers: vec![OscillatorLayer::new(Triangle, 185.0, 0.6)],
                noise: 0.8,
                attack_ms: 1.0,
                decay_ms: 170.0,
                duration_ms: 180.0,
                volume: 0.9,
                lfo: None,
            },
            Preset::Hihat => MultiOscillatorParams {
                layers: vec![OscillatorLayer::new(Square, 6000.0, 0.2)],
                noise: 1.0,
                attack_ms: 0.5,
                decay_ms: 55.0,
                duration_ms: 60.0,
                volume: 0.6,
                lfo: None,
            },
            Preset::Clap => MultiOscillatorParams {
                layers: Vec::new(),
                noise: 1.0,
                attack_ms: 2.0,
                decay_ms: 140.0,
                duration_ms: 150.0,
                volume: 0.8,
                // fast tremolo smears the noise into a few bursts
                lfo: Some(Lfo { rate_hz: 40.0, depth: 0.8, waveform: Square, target: LfoTarget::Volume }),
            },
            Preset::Bass => MultiOscillatorParams {
                layers: vec![
                    OscillatorLayer::new(Saw, 55.0, 0.8),
                    OscillatorLayer::new(Sine, 27.5, 1.0),
                ],
                noise: 0.0,
                attack_ms: 5.0,
                decay_ms: 250.0,
                duration_ms: 500.0,
                volume: 0.8,
                lfo: None,
            },
            Preset::Lead => MultiOscillatorParams {
                layers: vec![
                    OscillatorLayer::new(Square, 440.0, 0.6),
                    OscillatorLayer::new(Saw, 442.0, 0.6),
                ],
                noise: 0.0,
                attack_ms: 10.0,
                decay_ms: 300.0,
                duration_ms: 800.0,
                volume: 0.7,
                lfo: Some(Lfo { rate_hz: 5.5, depth: 0.2, waveform: Sine, target: LfoTarget::Pitch }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for p in Preset::ALL {
            assert_eq!(Preset::from_name(p.name()), Some(p));
        }
        assert_eq!(Preset::from_name("KICK"), Some(Preset::Kick));
        assert_eq!(Preset::from_name("cowbell"), None);
    }

    #[test]
    fn test_presets_fit_their_duration() {
        for p in Preset::ALL {
            let params = p.params();
            assert!(params.duration_ms > 0.0, "{}", p.name());
            assert!(params.attack_ms + params.decay_ms <= params.duration_ms, "{}", p.name());
            assert!(!params.layers.is_empty() || params.noise > 0.0, "{}", p.name());
        }
    }

    #[test]
    fn test_params_deserialize_from_json() {
        let json = serde_json::to_string(&Preset::Lead.params()).unwrap();
        let back: MultiOscillatorParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Preset::Lead.params());
    }
}
