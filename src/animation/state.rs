use rustc_hash::FxHashMap;

use crate::errors::{AnimationError, Result};

/// Playback state of one animation on one skeleton or entity.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationState {
    name: String,
    time_position: f32,
    length: f32,
    weight: f32,
    enabled: bool,
    looping: bool,
    blend_mask: Option<Vec<f32>>,
}

impl AnimationState {
    fn new(name: String, time_position: f32, length: f32, weight: f32) -> Self {
        Self {
            name,
            time_position,
            length,
            weight,
            enabled: false,
            looping: true,
            blend_mask: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn time_position(&self) -> f32 {
        self.time_position
    }

    /// Sets the time position, wrapping into `[0, length)` when looping and
    /// clamping to `[0, length]` otherwise.
    pub fn set_time_position(&mut self, time_position: f32) {
        if self.looping && self.length > 0.0 {
            let mut wrapped = time_position % self.length;
            if wrapped < 0.0 {
                wrapped += self.length;
            }
            self.time_position = wrapped;
        } else {
            self.time_position = time_position.clamp(0.0, self.length.max(0.0));
        }
    }

    /// Advances the time position by `offset` seconds.
    pub fn add_time(&mut self, offset: f32) {
        self.set_time_position(self.time_position + offset);
    }

    #[must_use]
    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn set_length(&mut self, length: f32) {
        self.length = length;
    }

    #[must_use]
    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f32) {
        self.weight = weight;
    }

    /// Enabling goes through [`AnimationStateSet::set_enabled`] so the set
    /// can keep its blend order.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// A non-looping state that reached its end.
    #[must_use]
    pub fn has_ended(&self) -> bool {
        !self.looping && self.time_position >= self.length
    }

    // ========================================================================
    // Blend mask
    // ========================================================================

    /// Creates a per-bone weight mask with `size` entries. Does nothing if a
    /// mask already exists.
    pub fn create_blend_mask(&mut self, size: usize, initial_weight: f32) {
        if self.blend_mask.is_none() {
            self.blend_mask = Some(vec![initial_weight; size]);
        } else {
            log::debug!("Animation state '{}' already has a blend mask", self.name);
        }
    }

    pub fn destroy_blend_mask(&mut self) {
        self.blend_mask = None;
    }

    #[must_use]
    pub fn has_blend_mask(&self) -> bool {
        self.blend_mask.is_some()
    }

    #[must_use]
    pub fn blend_mask(&self) -> Option<&[f32]> {
        self.blend_mask.as_deref()
    }

    /// Replaces the whole mask.
    pub fn set_blend_mask(&mut self, mask: &[f32]) {
        self.blend_mask = Some(mask.to_vec());
    }

    pub fn set_blend_mask_entry(&mut self, bone_handle: u16, weight: f32) -> Result<()> {
        let name = &self.name;
        let entry = self
            .blend_mask
            .as_mut()
            .and_then(|mask| mask.get_mut(usize::from(bone_handle)))
            .ok_or_else(|| blend_mask_entry_missing(name, bone_handle))?;
        *entry = weight;
        Ok(())
    }

    pub fn blend_mask_entry(&self, bone_handle: u16) -> Result<f32> {
        self.blend_mask
            .as_ref()
            .and_then(|mask| mask.get(usize::from(bone_handle)).copied())
            .ok_or_else(|| blend_mask_entry_missing(&self.name, bone_handle))
    }

    /// Copies time, length, weight, loop flag and mask from `other`. The
    /// enabled flag is left alone.
    pub fn copy_state_from(&mut self, other: &AnimationState) {
        self.time_position = other.time_position;
        self.length = other.length;
        self.weight = other.weight;
        self.looping = other.looping;
        self.blend_mask.clone_from(&other.blend_mask);
    }
}

fn blend_mask_entry_missing(name: &str, bone_handle: u16) -> AnimationError {
    AnimationError::InvalidParameters(format!(
        "animation state '{name}' has no blend mask entry for bone {bone_handle}"
    ))
}

// ============================================================================
// State set
// ============================================================================

/// Named animation states in creation order.
///
/// Enabled states are kept in a separate list in the order they were
/// enabled; that order is the order a skeleton blends them in.
#[derive(Debug, Clone, Default)]
pub struct AnimationStateSet {
    states: Vec<AnimationState>,
    index: FxHashMap<String, usize>,
    enabled: Vec<usize>,
}

impl AnimationStateSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a disabled, looping state with weight 1.
    pub fn create_animation_state(
        &mut self,
        name: &str,
        time_position: f32,
        length: f32,
    ) -> Result<&mut AnimationState> {
        if self.index.contains_key(name) {
            return Err(AnimationError::DuplicateItem(format!(
                "state for animation named '{name}' already exists"
            )));
        }
        Ok(self.push_state(name, time_position, length))
    }

    /// Returns the state for `name`, creating a disabled one at time 0 when
    /// the set has none.
    pub fn animation_state_or_insert(&mut self, name: &str, length: f32) -> &mut AnimationState {
        match self.index.get(name) {
            Some(&slot) => &mut self.states[slot],
            None => self.push_state(name, 0.0, length),
        }
    }

    fn push_state(&mut self, name: &str, time_position: f32, length: f32) -> &mut AnimationState {
        let slot = self.states.len();
        self.index.insert(name.to_owned(), slot);
        self.states
            .push(AnimationState::new(name.to_owned(), time_position, length, 1.0));
        &mut self.states[slot]
    }

    #[must_use]
    pub fn has_animation_state(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn animation_state(&self, name: &str) -> Result<&AnimationState> {
        self.index
            .get(name)
            .map(|&i| &self.states[i])
            .ok_or_else(|| state_not_found(name))
    }

    pub fn animation_state_mut(&mut self, name: &str) -> Result<&mut AnimationState> {
        match self.index.get(name) {
            Some(&i) => Ok(&mut self.states[i]),
            None => Err(state_not_found(name)),
        }
    }

    pub fn remove_animation_state(&mut self, name: &str) -> Result<()> {
        let slot = self.index.remove(name).ok_or_else(|| state_not_found(name))?;
        self.states.remove(slot);
        self.enabled.retain(|&i| i != slot);
        for i in self.index.values_mut().chain(self.enabled.iter_mut()) {
            if *i > slot {
                *i -= 1;
            }
        }
        Ok(())
    }

    pub fn remove_all_animation_states(&mut self) {
        self.states.clear();
        self.index.clear();
        self.enabled.clear();
    }

    /// Enables or disables a state. A state that gets enabled moves to the
    /// end of the blend order.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let slot = *self.index.get(name).ok_or_else(|| state_not_found(name))?;
        self.set_slot_enabled(slot, enabled);
        Ok(())
    }

    fn set_slot_enabled(&mut self, slot: usize, enabled: bool) {
        let state = &mut self.states[slot];
        if state.enabled == enabled {
            return;
        }
        state.enabled = enabled;
        if enabled {
            self.enabled.push(slot);
        } else {
            self.enabled.retain(|&i| i != slot);
        }
    }

    #[must_use]
    pub fn num_animation_states(&self) -> usize {
        self.states.len()
    }

    /// All states in creation order.
    pub fn animation_states(&self) -> impl Iterator<Item = &AnimationState> {
        self.states.iter()
    }

    pub fn animation_states_mut(&mut self) -> impl Iterator<Item = &mut AnimationState> {
        self.states.iter_mut()
    }

    /// Enabled states in the order they were enabled.
    pub fn enabled_animation_states(&self) -> impl Iterator<Item = &AnimationState> {
        self.enabled.iter().map(|&i| &self.states[i])
    }

    #[must_use]
    pub fn has_enabled_animation_state(&self) -> bool {
        !self.enabled.is_empty()
    }

    /// Copies the state of every entry of this set that also exists in
    /// `target`, including the enabled flag.
    pub fn copy_matching_state(&self, target: &mut AnimationStateSet) {
        for state in &self.states {
            let Some(&slot) = target.index.get(&state.name) else {
                continue;
            };
            target.states[slot].copy_state_from(state);
            target.set_slot_enabled(slot, state.enabled);
        }
    }
}

fn state_not_found(name: &str) -> AnimationError {
    AnimationError::ItemNotFound(format!("no state found for animation named '{name}'"))
}
