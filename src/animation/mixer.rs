//! The animation mixer: owns the clips of a model, advances the actions
//! playing them and samples the result into a [`Pose`].

use crate::animation::clip::{AnimationClip, Pose};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Play to the end, then stop.
    Once,
    /// Jump back to the start after every pass.
    #[default]
    Repeat,
    /// Alternate between playing forwards and backwards.
    PingPong,
}

/// Handle to an action owned by an [`AnimationMixer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ActionId(usize);

/// Playback state of one clip.
#[derive(Clone, Debug)]
pub struct AnimationAction {
    clip: usize,
    time: f32,
    pub time_scale: f32,
    loop_mode: LoopMode,
    repetitions: Option<u32>,
    loop_count: u32,
    running: bool,
}

impl AnimationAction {
    fn new(clip: usize) -> Self {
        Self {
            clip,
            time: 0.0,
            time_scale: 1.0,
            loop_mode: LoopMode::Repeat,
            repetitions: None,
            loop_count: 0,
            running: false,
        }
    }

    pub fn play(&mut self) -> &mut Self {
        self.running = true;
        self
    }

    /// Stops playback and rewinds to the start.
    pub fn stop(&mut self) -> &mut Self {
        self.running = false;
        self.time = 0.0;
        self.loop_count = 0;
        self
    }

    /// `repetitions` is the number of passes before the action stops, `None` never stops.
    pub fn set_loop(&mut self, mode: LoopMode, repetitions: Option<u32>) -> &mut Self {
        self.loop_mode = mode;
        self.repetitions = repetitions;
        self
    }

    pub fn clip(&self) -> usize {
        self.clip
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn repetitions(&self) -> Option<u32> {
        self.repetitions
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Advances the local time by `dt` seconds and returns the time to sample.
    fn advance(&mut self, dt: f32, duration: f32) -> f32 {
        let dt = dt * self.time_scale;
        if duration <= 0.0 {
            self.time = 0.0;
            if self.loop_mode == LoopMode::Once {
                self.running = false;
            }
            return 0.0;
        }

        if self.loop_mode == LoopMode::Once {
            self.time += dt;
            if self.time >= duration {
                self.time = duration;
                self.running = false;
            } else if self.time < 0.0 {
                self.time = 0.0;
                self.running = false;
            }
            return self.time;
        }

        self.time += dt;
        if self.time >= duration || self.time < 0.0 {
            let passes = (self.time / duration).floor();
            self.time -= duration * passes;
            self.loop_count = self.loop_count.saturating_add(passes.abs() as u32);

            if let Some(repetitions) = self.repetitions {
                if self.loop_count >= repetitions {
                    self.running = false;
                    self.loop_count = repetitions;
                    self.time = if dt > 0.0 { duration } else { 0.0 };
                    // an even ping-pong count ends on a backwards pass
                    if self.loop_mode == LoopMode::PingPong && repetitions % 2 == 0 {
                        return duration - self.time;
                    }
                    return self.time;
                }
            }
        }

        if self.loop_mode == LoopMode::PingPong && self.loop_count % 2 == 1 {
            duration - self.time
        } else {
            self.time
        }
    }
}

/// Owns the clips of one model and the actions playing them.
#[derive(Clone, Debug, Default)]
pub struct AnimationMixer {
    clips: Vec<AnimationClip>,
    actions: Vec<AnimationAction>,
}

impl AnimationMixer {
    pub fn new(clips: Vec<AnimationClip>) -> Self {
        Self {
            clips,
            actions: Vec::new(),
        }
    }

    pub fn clips(&self) -> &[AnimationClip] {
        &self.clips
    }

    /// Returns the action for the clip at `index`, creating it on first use.
    ///
    /// Each clip has at most one action, asking twice returns the same handle.
    pub fn clip_action(&mut self, index: usize) -> Option<ActionId> {
        if index >= self.clips.len() {
            return None;
        }
        if let Some(existing) = self.actions.iter().position(|a| a.clip == index) {
            return Some(ActionId(existing));
        }
        self.actions.push(AnimationAction::new(index));
        Some(ActionId(self.actions.len() - 1))
    }

    pub fn action(&self, id: ActionId) -> Option<&AnimationAction> {
        self.actions.get(id.0)
    }

    pub fn action_mut(&mut self, id: ActionId) -> Option<&mut AnimationAction> {
        self.actions.get_mut(id.0)
    }

    pub fn running_actions(&self) -> impl Iterator<Item = &AnimationAction> {
        self.actions.iter().filter(|a| a.running)
    }

    /// Advances all running actions by `dt` seconds and samples them.
    ///
    /// Actions are applied in creation order, so a later action overrides the
    /// properties an earlier one animates.
    pub fn update(&mut self, dt: f32) -> Pose {
        let mut pose = Pose::new();
        for action in self.actions.iter_mut().filter(|a| a.running) {
            let clip = &self.clips[action.clip];
            let t = action.advance(dt, clip.duration);
            clip.sample(t, &mut pose);
        }
        pose
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Vector3;

    use super::*;
    use crate::animation::clip::{Channel, Interpolation, Keyframes};

    fn slide(name: &str, duration: f32) -> AnimationClip {
        AnimationClip::new(
            name,
            vec![Channel {
                target: 7,
                interpolation: Interpolation::Linear,
                timestamps: vec![0.0, duration],
                keyframes: Keyframes::Translation(vec![
                    Vector3::new(0.0, 0.0, 0.0),
                    Vector3::new(duration, 0.0, 0.0),
                ]),
            }],
        )
    }

    fn x_of(pose: &Pose) -> f32 {
        pose[&7].translation.unwrap().x
    }

    #[test]
    fn no_clips_means_no_action_and_an_empty_pose() {
        let mut mixer = AnimationMixer::new(vec![]);
        assert!(mixer.clip_action(0).is_none());
        assert!(mixer.update(0.01).is_empty());
        assert_eq!(mixer.running_actions().count(), 0);
    }

    #[test]
    fn clip_action_is_cached_per_clip() {
        let mut mixer = AnimationMixer::new(vec![slide("a", 1.0), slide("b", 1.0)]);
        let a = mixer.clip_action(0).unwrap();
        let b = mixer.clip_action(1).unwrap();
        assert_ne!(a, b);
        assert_eq!(mixer.clip_action(0), Some(a));
        assert_eq!(mixer.action(b).unwrap().clip(), 1);
    }

    #[test]
    fn actions_do_nothing_until_played() {
        let mut mixer = AnimationMixer::new(vec![slide("a", 1.0)]);
        let id = mixer.clip_action(0).unwrap();
        assert!(mixer.update(0.5).is_empty());
        mixer.action_mut(id).unwrap().play();
        let pose = mixer.update(0.5);
        assert!((x_of(&pose) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn repeat_wraps_forever() {
        let mut mixer = AnimationMixer::new(vec![slide("a", 2.0)]);
        let id = mixer.clip_action(0).unwrap();
        mixer
            .action_mut(id)
            .unwrap()
            .play()
            .set_loop(LoopMode::Repeat, None);
        for _ in 0..1000 {
            mixer.update(0.25);
        }
        let action = mixer.action(id).unwrap();
        assert!(action.is_running());
        assert_eq!(action.loop_count(), 125);
        assert!(action.time() < 2.0);
        let pose = mixer.update(0.5);
        assert!((x_of(&pose) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn finite_repetitions_stop_at_the_end() {
        let mut mixer = AnimationMixer::new(vec![slide("a", 1.0)]);
        let id = mixer.clip_action(0).unwrap();
        mixer
            .action_mut(id)
            .unwrap()
            .play()
            .set_loop(LoopMode::Repeat, Some(2));
        mixer.update(1.5);
        assert!(mixer.action(id).unwrap().is_running());
        let pose = mixer.update(1.0);
        assert!(!mixer.action(id).unwrap().is_running());
        assert!((x_of(&pose) - 1.0).abs() < 1e-6);
        assert!(mixer.update(1.0).is_empty());
    }

    #[test]
    fn once_clamps_and_stops() {
        let mut mixer = AnimationMixer::new(vec![slide("a", 1.0)]);
        let id = mixer.clip_action(0).unwrap();
        mixer
            .action_mut(id)
            .unwrap()
            .play()
            .set_loop(LoopMode::Once, None);
        let pose = mixer.update(3.0);
        assert!((x_of(&pose) - 1.0).abs() < 1e-6);
        assert!(!mixer.action(id).unwrap().is_running());
    }

    #[test]
    fn ping_pong_plays_odd_passes_backwards() {
        let mut mixer = AnimationMixer::new(vec![slide("a", 1.0)]);
        let id = mixer.clip_action(0).unwrap();
        mixer
            .action_mut(id)
            .unwrap()
            .play()
            .set_loop(LoopMode::PingPong, None);
        let pose = mixer.update(1.25);
        assert!((x_of(&pose) - 0.75).abs() < 1e-5);
        let pose = mixer.update(1.0);
        assert!((x_of(&pose) - 0.25).abs() < 1e-5);
    }

    #[test]
    fn ping_pong_with_even_repetitions_stops_at_the_start() {
        let mut mixer = AnimationMixer::new(vec![slide("a", 1.0)]);
        let id = mixer.clip_action(0).unwrap();
        mixer
            .action_mut(id)
            .unwrap()
            .play()
            .set_loop(LoopMode::PingPong, Some(2));
        mixer.update(1.5);
        assert!(mixer.action(id).unwrap().is_running());
        let pose = mixer.update(0.6);
        let action = mixer.action(id).unwrap();
        assert!(!action.is_running());
        assert_eq!(action.loop_count(), 2);
        assert!(x_of(&pose).abs() < 1e-6);
    }

    #[test]
    fn ping_pong_with_odd_repetitions_stops_at_the_end() {
        let mut mixer = AnimationMixer::new(vec![slide("a", 1.0)]);
        let id = mixer.clip_action(0).unwrap();
        mixer
            .action_mut(id)
            .unwrap()
            .play()
            .set_loop(LoopMode::PingPong, Some(3));
        let pose = mixer.update(3.2);
        assert!(!mixer.action(id).unwrap().is_running());
        assert!((x_of(&pose) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_duration_clips_hold_their_first_frame() {
        let mut mixer = AnimationMixer::new(vec![slide("a", 0.0)]);
        let id = mixer.clip_action(0).unwrap();
        mixer.action_mut(id).unwrap().play();
        let pose = mixer.update(0.3);
        assert_eq!(x_of(&pose), 0.0);
        assert!(mixer.action(id).unwrap().is_running());
        assert_eq!(mixer.action(id).unwrap().time(), 0.0);
    }

    #[test]
    fn stop_rewinds() {
        let mut mixer = AnimationMixer::new(vec![slide("a", 1.0)]);
        let id = mixer.clip_action(0).unwrap();
        mixer.action_mut(id).unwrap().play();
        mixer.update(0.4);
        let action = mixer.action_mut(id).unwrap();
        action.stop();
        assert_eq!(action.time(), 0.0);
        assert!(!action.is_running());
    }
}
