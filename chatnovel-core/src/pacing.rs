//! Smart delay heuristics.
//!
//! Every pause the engine takes is derived from a [`PacingConfig`]: a base
//! duration (fixed or scaled by content length) plus random jitter. The
//! [`Pacer`] returns these human-scale durations; the global time scale is
//! applied separately by [`Pacer::scale`] right before sleeping, so the
//! sequence of indicators and cues never depends on the time scale.

use crate::script::{NodeKind, ScriptNode};
use rand::Rng;
use std::time::Duration;

/// A fixed base plus up to `jitter_ms` of random extra time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayWindow {
    pub base_ms: u64,
    pub jitter_ms: u64,
}

impl DelayWindow {
    pub const fn new(base_ms: u64, jitter_ms: u64) -> Self {
        Self { base_ms, jitter_ms }
    }

    /// Inclusive-exclusive bounds in milliseconds.
    pub fn bounds(&self) -> (u64, u64) {
        (self.base_ms, self.base_ms + self.jitter_ms)
    }

    fn sample_ms<R: Rng>(&self, rng: &mut R) -> f64 {
        self.base_ms as f64 + jitter(rng, self.jitter_ms)
    }
}

/// A duration proportional to content length, clamped, plus jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LengthScaled {
    pub per_char_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub jitter_ms: u64,
}

impl LengthScaled {
    pub const fn new(per_char_ms: u64, min_ms: u64, max_ms: u64, jitter_ms: u64) -> Self {
        Self {
            per_char_ms,
            min_ms,
            max_ms,
            jitter_ms,
        }
    }

    /// Base duration before jitter.
    pub fn base_ms(&self, chars: usize) -> u64 {
        (chars as u64)
            .saturating_mul(self.per_char_ms)
            .clamp(self.min_ms, self.max_ms)
    }

    fn sample_ms<R: Rng>(&self, chars: usize, rng: &mut R) -> f64 {
        self.base_ms(chars) as f64 + jitter(rng, self.jitter_ms)
    }
}

fn jitter<R: Rng>(rng: &mut R, max_ms: u64) -> f64 {
    if max_ms == 0 {
        0.0
    } else {
        rng.gen_range(0.0..max_ms as f64)
    }
}

/// Every tunable pause the engine takes.
#[derive(Debug, Clone, PartialEq)]
pub struct PacingConfig {
    /// Multiplier applied to every pause. `0.0` disables pacing.
    pub time_scale: f64,
    /// NPC typing before a text message.
    pub text: LengthScaled,
    /// NPC recording before an audio message.
    pub audio: DelayWindow,
    /// NPC preparing an image.
    pub image: DelayWindow,
    /// Pause before a system message.
    pub system: LengthScaled,
    /// Time the player needs to read a message before the next one.
    pub auto_read: LengthScaled,
    /// NPC reading the player's last message.
    pub reading: DelayWindow,
    /// NPC thinking after reading.
    pub thinking: DelayWindow,
    /// One burst of fake typing.
    pub fake_typing: DelayWindow,
    /// Pause between fake typing bursts.
    pub fake_typing_pause: DelayWindow,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            text: LengthScaled::new(60, 1500, 5000, 500),
            audio: DelayWindow::new(12000, 6000),
            image: DelayWindow::new(3000, 2000),
            system: LengthScaled::new(40, 1000, 3000, 0),
            auto_read: LengthScaled::new(55, 1500, 5500, 500),
            reading: DelayWindow::new(1000, 2500),
            thinking: DelayWindow::new(500, 1500),
            fake_typing: DelayWindow::new(1500, 1500),
            fake_typing_pause: DelayWindow::new(800, 1200),
        }
    }
}

impl PacingConfig {
    /// Default windows with every pause disabled.
    pub fn instant() -> Self {
        Self {
            time_scale: 0.0,
            ..Self::default()
        }
    }

    pub fn with_time_scale(mut self, scale: f64) -> Self {
        self.time_scale = scale.max(0.0);
        self
    }
}

/// Samples pauses from a [`PacingConfig`].
///
/// Sampling is synchronous and never holds an RNG across an await point.
#[derive(Debug, Clone, Default)]
pub struct Pacer {
    config: PacingConfig,
}

impl Pacer {
    pub fn new(config: PacingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PacingConfig {
        &self.config
    }

    fn millis(ms: f64) -> Duration {
        Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(Duration::ZERO)
    }

    /// Apply the configured time scale to a human-scale duration.
    pub fn scale(&self, duration: Duration) -> Duration {
        let factor = self.config.time_scale;
        if !(factor.is_finite() && factor > 0.0) {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(duration.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }

    /// Typing/recording delay before an NPC message is delivered.
    ///
    /// A positive explicit `delay` on the node overrides every heuristic.
    pub fn smart_delay(&self, node: &ScriptNode) -> Duration {
        self.smart_delay_with_rng(node, &mut rand::thread_rng())
    }

    pub fn smart_delay_with_rng<R: Rng>(&self, node: &ScriptNode, rng: &mut R) -> Duration {
        if let Some(ms) = node.delay.filter(|&ms| ms > 0.0) {
            return Self::millis(ms);
        }
        let ms = match node.kind {
            NodeKind::Audio => self.config.audio.sample_ms(rng),
            NodeKind::Image => self.config.image.sample_ms(rng),
            _ => self.config.text.sample_ms(node.content_len(), rng),
        };
        Self::millis(ms)
    }

    /// Pause before a system message. An explicit `delay` wins.
    pub fn system_pause(&self, node: &ScriptNode) -> Duration {
        if let Some(ms) = node.delay.filter(|&ms| ms > 0.0) {
            return Self::millis(ms);
        }
        let ms = self
            .config
            .system
            .sample_ms(node.content_len(), &mut rand::thread_rng());
        Self::millis(ms)
    }

    /// Time the player gets to read a delivered message.
    pub fn auto_read(&self, node: &ScriptNode) -> Duration {
        let ms = self
            .config
            .auto_read
            .sample_ms(node.content_len(), &mut rand::thread_rng());
        Self::millis(ms)
    }

    pub fn reading(&self) -> Duration {
        self.window(self.config.reading)
    }

    pub fn thinking(&self) -> Duration {
        self.window(self.config.thinking)
    }

    pub fn fake_typing(&self) -> Duration {
        self.window(self.config.fake_typing)
    }

    pub fn fake_typing_pause(&self) -> Duration {
        self.window(self.config.fake_typing_pause)
    }

    fn window(&self, window: DelayWindow) -> Duration {
        Self::millis(window.sample_ms(&mut rand::thread_rng()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptNode;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn node(kind: NodeKind, content: &str) -> ScriptNode {
        ScriptNode {
            kind,
            ..ScriptNode::message("n", "valeria", content)
        }
    }

    fn ms(d: Duration) -> u128 {
        d.as_millis()
    }

    #[test]
    fn test_length_scaled_clamps() {
        let text = PacingConfig::default().text;
        assert_eq!(text.base_ms(0), 1500);
        assert_eq!(text.base_ms(50), 3000);
        assert_eq!(text.base_ms(10_000), 5000);
    }

    #[test]
    fn test_smart_delay_windows_hold_for_any_draw() {
        let pacer = Pacer::default();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let short = ms(pacer.smart_delay_with_rng(&node(NodeKind::Message, "hey"), &mut rng));
            assert!((1500..2000).contains(&short), "short text delay {short}");

            let long = "a".repeat(400);
            let long = ms(pacer.smart_delay_with_rng(&node(NodeKind::Text, &long), &mut rng));
            assert!((5000..5500).contains(&long), "long text delay {long}");

            let audio = ms(pacer.smart_delay_with_rng(&node(NodeKind::Audio, "voice.mp3"), &mut rng));
            assert!((12000..18000).contains(&audio), "audio delay {audio}");

            let image = ms(pacer.smart_delay_with_rng(&node(NodeKind::Image, "pic.png"), &mut rng));
            assert!((3000..5000).contains(&image), "image delay {image}");
        }
    }

    #[test]
    fn test_explicit_delay_overrides_heuristic() {
        let pacer = Pacer::default();
        let mut n = node(NodeKind::Audio, "voice.mp3");
        n.delay = Some(250.0);
        assert_eq!(pacer.smart_delay(&n), Duration::from_millis(250));

        n.delay = Some(-40.0);
        assert!(pacer.smart_delay(&n) >= Duration::from_millis(12000));
    }

    #[test]
    fn test_system_pause_has_no_jitter() {
        let pacer = Pacer::default();
        assert_eq!(pacer.system_pause(&node(NodeKind::Message, "")), Duration::from_millis(1000));
        assert_eq!(
            pacer.system_pause(&node(NodeKind::Message, &"x".repeat(50))),
            Duration::from_millis(2000)
        );
    }

    #[test]
    fn test_instant_pacing_scales_to_zero() {
        let pacer = Pacer::new(PacingConfig::instant());
        let delay = pacer.smart_delay(&node(NodeKind::Audio, "v"));
        assert!(delay >= Duration::from_millis(12000));
        assert_eq!(pacer.scale(delay), Duration::ZERO);
    }

    #[test]
    fn test_time_scale_halves() {
        let pacer = Pacer::new(PacingConfig::default().with_time_scale(0.5));
        let mut n = node(NodeKind::Text, "hey");
        n.delay = Some(1000.0);
        assert_eq!(pacer.smart_delay(&n), Duration::from_millis(1000));
        assert_eq!(pacer.scale(pacer.smart_delay(&n)), Duration::from_millis(500));
    }

    #[test]
    fn test_negative_or_nan_scale_is_zero() {
        let mut config = PacingConfig::default();
        config.time_scale = f64::NAN;
        let pacer = Pacer::new(config);
        assert_eq!(pacer.scale(Duration::from_secs(3)), Duration::ZERO);
        assert_eq!(
            Pacer::new(PacingConfig::default().with_time_scale(-2.0)).scale(Duration::from_secs(3)),
            Duration::ZERO
        );
    }
}
