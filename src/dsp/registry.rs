//! Voice registry — note-keyed bookkeeping of live voices.

use std::collections::HashMap;

use super::voice::{Voice, VoiceId};

/// Live voices, plus a per-note stack of the ones still held down.
///
/// A note can sound several times at once. Its stack is ordered by start, so
/// a plain note-off releases the most recent voice. Released voices leave the
/// stack but stay registered (and keep receiving parameter changes) until
/// [`VoiceRegistry::reap`] drops them after their tail has played out.
#[derive(Debug, Default)]
pub struct VoiceRegistry {
    held: HashMap<u8, Vec<VoiceId>>,
    voices: HashMap<VoiceId, Voice>,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a voice as held.
    pub fn insert(&mut self, voice: Voice) {
        let id = voice.id();
        self.held.entry(id.note()).or_default().push(id);
        self.voices.insert(id, voice);
    }

    /// Remove and return the most recently started held voice of `note`.
    pub fn pop_latest(&mut self, note: u8) -> Option<VoiceId> {
        let stack = self.held.get_mut(&note)?;
        let id = stack.pop();
        if stack.is_empty() {
            self.held.remove(&note);
        }
        id
    }

    /// Remove `id` from the held stack of its note. Returns `false` when the
    /// voice is not held.
    pub fn take(&mut self, id: &VoiceId) -> bool {
        let note = id.note();
        let Some(stack) = self.held.get_mut(&note) else {
            return false;
        };
        let Some(position) = stack.iter().position(|held| held == id) else {
            return false;
        };
        stack.remove(position);
        if stack.is_empty() {
            self.held.remove(&note);
        }
        true
    }

    /// Empty every held stack, returning the ids in start order per note.
    pub fn take_all(&mut self) -> Vec<VoiceId> {
        let mut ids: Vec<VoiceId> = self.held.drain().flat_map(|(_, stack)| stack).collect();
        ids.sort_by_key(|id| id.serial());
        ids
    }

    pub fn get(&self, id: &VoiceId) -> Option<&Voice> {
        self.voices.get(id)
    }

    pub fn get_mut(&mut self, id: &VoiceId) -> Option<&mut Voice> {
        self.voices.get_mut(id)
    }

    pub fn voices_mut(&mut self) -> impl Iterator<Item = &mut Voice> {
        self.voices.values_mut()
    }

    pub fn voices(&self) -> impl Iterator<Item = &Voice> {
        self.voices.values()
    }

    /// Held voices of `note`, oldest first.
    pub fn stack(&self, note: u8) -> &[VoiceId] {
        self.held.get(&note).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop voices whose release finished by `now`. Returns how many went.
    pub fn reap(&mut self, now: f64) -> usize {
        let before = self.voices.len();
        self.voices.retain(|_, voice| {
            if voice.is_finished(now) {
                voice.terminate();
                false
            } else {
                true
            }
        });

        let reaped = before - self.voices.len();
        if reaped > 0 {
            let voices = &self.voices;
            self.held.retain(|_, stack| {
                stack.retain(|id| voices.contains_key(id));
                !stack.is_empty()
            });
            log::debug!("Reaped {reaped} voice(s), {} remaining", self.voices.len());
        }
        reaped
    }

    /// Registered voices, releasing ones included.
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Voices still held down.
    pub fn held_count(&self) -> usize {
        self.held.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SynthConfig;
    use crate::dsp::graph::{AudioGraph, GraphRenderer};

    fn setup() -> (AudioGraph, GraphRenderer, VoiceRegistry) {
        let (graph, renderer) = AudioGraph::new(44100.0);
        (graph, renderer, VoiceRegistry::new())
    }

    fn add(graph: &mut AudioGraph, registry: &mut VoiceRegistry, note: u8, serial: u64) -> VoiceId {
        let destination = graph.destination();
        let id = VoiceId::new(note, 0.0, serial);
        let mut voice = Voice::new(graph, id, &SynthConfig::default(), 440.0, 1.0, destination);
        voice.start(graph, 0.0);
        registry.insert(voice);
        id
    }

    #[test]
    fn latest_voice_pops_first() {
        let (mut graph, _renderer, mut registry) = setup();
        let first = add(&mut graph, &mut registry, 60, 1);
        let second = add(&mut graph, &mut registry, 60, 2);

        assert_eq!(registry.stack(60), &[first, second]);
        assert_eq!(registry.pop_latest(60), Some(second));
        assert_eq!(registry.pop_latest(60), Some(first));
        assert_eq!(registry.pop_latest(60), None);
        assert_eq!(registry.len(), 2, "Popped voices stay registered");
        assert_eq!(registry.held_count(), 0);
    }

    #[test]
    fn take_removes_a_specific_voice() {
        let (mut graph, _renderer, mut registry) = setup();
        let first = add(&mut graph, &mut registry, 60, 1);
        let second = add(&mut graph, &mut registry, 60, 2);

        assert!(registry.take(&first));
        assert!(!registry.take(&first));
        assert_eq!(registry.stack(60), &[second]);
        assert!(!registry.take(&VoiceId::new(61, 0.0, 9)));
    }

    #[test]
    fn take_all_orders_by_start() {
        let (mut graph, _renderer, mut registry) = setup();
        let a = add(&mut graph, &mut registry, 64, 1);
        let b = add(&mut graph, &mut registry, 60, 2);
        let c = add(&mut graph, &mut registry, 64, 3);

        assert_eq!(registry.take_all(), vec![a, b, c]);
        assert_eq!(registry.held_count(), 0);
    }

    #[test]
    fn reap_drops_finished_voices_only() {
        let (mut graph, _renderer, mut registry) = setup();
        let released = add(&mut graph, &mut registry, 60, 1);
        let held = add(&mut graph, &mut registry, 62, 2);

        registry.take(&released);
        if let Some(voice) = registry.get_mut(&released) {
            voice.stop(&graph, 0.5);
        }
        let stop_at = registry.get(&released).and_then(Voice::stop_time).unwrap();

        assert_eq!(registry.reap(stop_at - 0.01), 0);
        assert_eq!(registry.reap(stop_at), 1);
        assert!(registry.get(&released).is_none());
        assert_eq!(registry.stack(62), &[held]);
        assert_eq!(registry.len(), 1);
    }
}
