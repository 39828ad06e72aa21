//! Audio graph host — node creation, connections, and scheduled automation.
//!
//! The graph is split in two halves:
//!
//! - [`AudioGraph`] lives on the control thread. It hands out node handles and
//!   [`AudioParam`]s and never blocks: every request is pushed as a
//!   [`GraphCommand`] into a lock-free channel.
//! - [`GraphRenderer`] lives on the audio thread. It drains pending commands at
//!   the start of each block and renders the node graph sample by sample,
//!   pulling from the destination node.
//!
//! Both halves share a monotonic frame clock. Every [`AudioParam`] keeps a
//! mirror of its automation timeline on the control side, so the instantaneous
//! value of a parameter can be read back without touching render state.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender};

use super::automation::{AutomationEvent, RampKind, Timeline};
use super::compressor::{Compressor, CompressorConfig};
use super::filter::{BiquadFilter, FilterType};
use super::oscillator::{Oscillator, Waveform};

/// Identifies a node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// The graph's output node.
    pub const DESTINATION: NodeId = NodeId(0);
}

/// Automatable parameters of the node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Gain,
    Frequency,
    Detune,
    Q,
}

/// A specific automatable parameter on a specific node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId {
    pub node: NodeId,
    pub kind: ParamKind,
}

/// Requests sent from the control thread to the render thread.
#[derive(Debug, Clone)]
pub enum GraphCommand {
    CreateOscillator {
        id: NodeId,
        waveform: Waveform,
        frequency: f64,
        detune: f64,
    },
    CreateGain {
        id: NodeId,
        gain: f64,
    },
    CreateFilter {
        id: NodeId,
        filter_type: FilterType,
        frequency: f64,
        q: f64,
    },
    CreateCompressor {
        id: NodeId,
        config: CompressorConfig,
    },
    Connect {
        from: NodeId,
        to: NodeId,
    },
    Start {
        id: NodeId,
        time: f64,
    },
    Stop {
        id: NodeId,
        time: f64,
    },
    /// Remove the node (and all connections to it) once `time` has passed.
    Dispose {
        id: NodeId,
        time: f64,
    },
    SetWaveform {
        id: NodeId,
        waveform: Waveform,
    },
    SetFilterType {
        id: NodeId,
        filter_type: FilterType,
    },
    Automate {
        param: ParamId,
        event: AutomationEvent,
    },
    Cancel {
        param: ParamId,
        time: f64,
    },
}

fn send_command(sender: &Sender<GraphCommand>, command: GraphCommand) {
    if let Err(err) = sender.send(command) {
        log::warn!("Failed to send graph command: {err}");
    }
}

// ── Clock ───────────────────────────────────────────────────

/// Frame clock shared between control and render side.
#[derive(Debug)]
struct GraphClock {
    sample_rate: f64,
    frames: AtomicU64,
    running: AtomicBool,
}

impl GraphClock {
    fn current_time(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / self.sample_rate
    }
}

// ── Control side ────────────────────────────────────────────

/// Control-side handle of one automatable parameter.
///
/// Scheduling calls update the local timeline mirror and forward the same
/// event to the renderer.
#[derive(Debug, Clone)]
pub struct AudioParam {
    id: ParamId,
    timeline: Timeline,
    sender: Sender<GraphCommand>,
}

impl AudioParam {
    fn new(id: ParamId, default_value: f64, sender: Sender<GraphCommand>) -> Self {
        AudioParam {
            id,
            timeline: Timeline::new(default_value),
            sender,
        }
    }

    pub fn id(&self) -> ParamId {
        self.id
    }

    /// Value of the parameter at `time`, as currently scheduled.
    pub fn value_at(&self, time: f64) -> f64 {
        self.timeline.value_at(time)
    }

    pub fn set_value_at_time(&mut self, value: f64, time: f64) {
        self.schedule(AutomationEvent::SetValue { time, value });
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f64, time: f64) {
        self.ramp_to_value_at_time(RampKind::Linear, value, time);
    }

    pub fn exponential_ramp_to_value_at_time(&mut self, value: f64, time: f64) {
        self.ramp_to_value_at_time(RampKind::Exponential, value, time);
    }

    pub fn ramp_to_value_at_time(&mut self, kind: RampKind, value: f64, time: f64) {
        self.schedule(AutomationEvent::Ramp { kind, time, value });
    }

    /// Remove every event scheduled at or after `time`.
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.timeline.cancel_from(time);
        self.timeline.prune_before(time);
        send_command(&self.sender, GraphCommand::Cancel { param: self.id, time });
    }

    /// Replace any automation with a fixed value from `now` on.
    pub fn set_value_now(&mut self, value: f64, now: f64) {
        self.cancel_scheduled_values(now);
        self.set_value_at_time(value, now);
    }

    fn schedule(&mut self, event: AutomationEvent) {
        self.timeline.insert(event);
        send_command(
            &self.sender,
            GraphCommand::Automate {
                param: self.id,
                event,
            },
        );
    }
}

/// Handle of an oscillator node.
#[derive(Debug, Clone)]
pub struct OscillatorNode {
    pub id: NodeId,
    pub frequency: AudioParam,
    pub detune: AudioParam,
}

/// Handle of a gain node.
#[derive(Debug, Clone)]
pub struct GainNode {
    pub id: NodeId,
    pub gain: AudioParam,
}

/// Handle of a biquad filter node.
#[derive(Debug, Clone)]
pub struct FilterNode {
    pub id: NodeId,
    pub frequency: AudioParam,
    pub q: AudioParam,
}

/// Control-side interface of the audio graph host.
#[derive(Debug)]
pub struct AudioGraph {
    clock: Arc<GraphClock>,
    sender: Sender<GraphCommand>,
    next_id: u32,
}

impl AudioGraph {
    /// Create a graph and its renderer. The clock starts suspended.
    pub fn new(sample_rate: f64) -> (AudioGraph, GraphRenderer) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let clock = Arc::new(GraphClock {
            sample_rate,
            frames: AtomicU64::new(0),
            running: AtomicBool::new(false),
        });
        let graph = AudioGraph {
            clock: Arc::clone(&clock),
            sender,
            next_id: 1,
        };
        (graph, GraphRenderer::new(clock, receiver))
    }

    pub fn sample_rate(&self) -> f64 {
        self.clock.sample_rate
    }

    /// Monotonic render clock in seconds.
    pub fn current_time(&self) -> f64 {
        self.clock.current_time()
    }

    pub fn is_running(&self) -> bool {
        self.clock.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.clock.running.store(running, Ordering::Release);
    }

    pub fn destination(&self) -> NodeId {
        NodeId::DESTINATION
    }

    fn allocate_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    fn param(&self, node: NodeId, kind: ParamKind, default_value: f64) -> AudioParam {
        AudioParam::new(ParamId { node, kind }, default_value, self.sender.clone())
    }

    pub fn create_oscillator(
        &mut self,
        waveform: Waveform,
        frequency: f64,
        detune: f64,
    ) -> OscillatorNode {
        let id = self.allocate_id();
        self.send(GraphCommand::CreateOscillator {
            id,
            waveform,
            frequency,
            detune,
        });
        OscillatorNode {
            id,
            frequency: self.param(id, ParamKind::Frequency, frequency),
            detune: self.param(id, ParamKind::Detune, detune),
        }
    }

    pub fn create_gain(&mut self, gain: f64) -> GainNode {
        let id = self.allocate_id();
        self.send(GraphCommand::CreateGain { id, gain });
        GainNode {
            id,
            gain: self.param(id, ParamKind::Gain, gain),
        }
    }

    pub fn create_filter(&mut self, filter_type: FilterType, frequency: f64, q: f64) -> FilterNode {
        let id = self.allocate_id();
        self.send(GraphCommand::CreateFilter {
            id,
            filter_type,
            frequency,
            q,
        });
        FilterNode {
            id,
            frequency: self.param(id, ParamKind::Frequency, frequency),
            q: self.param(id, ParamKind::Q, q),
        }
    }

    pub fn create_compressor(&mut self, config: CompressorConfig) -> NodeId {
        let id = self.allocate_id();
        self.send(GraphCommand::CreateCompressor { id, config });
        id
    }

    pub fn connect(&self, from: NodeId, to: NodeId) {
        self.send(GraphCommand::Connect { from, to });
    }

    /// Schedule a source node to start producing output at `time`.
    pub fn start(&self, id: NodeId, time: f64) {
        self.send(GraphCommand::Start { id, time });
    }

    /// Schedule a source node to fall silent at `time`.
    pub fn stop(&self, id: NodeId, time: f64) {
        self.send(GraphCommand::Stop { id, time });
    }

    pub fn dispose(&self, id: NodeId, time: f64) {
        self.send(GraphCommand::Dispose { id, time });
    }

    pub fn set_waveform(&self, id: NodeId, waveform: Waveform) {
        self.send(GraphCommand::SetWaveform { id, waveform });
    }

    pub fn set_filter_type(&self, id: NodeId, filter_type: FilterType) {
        self.send(GraphCommand::SetFilterType { id, filter_type });
    }

    fn send(&self, command: GraphCommand) {
        send_command(&self.sender, command);
    }
}

// ── Render side ─────────────────────────────────────────────

#[derive(Debug)]
enum NodeKind {
    Destination,
    Oscillator {
        oscillator: Oscillator,
        frequency: Timeline,
        detune: Timeline,
        start: Option<f64>,
        stop: Option<f64>,
    },
    Gain {
        gain: Timeline,
    },
    Filter {
        filter: BiquadFilter,
        frequency: Timeline,
        q: Timeline,
    },
    Compressor {
        compressor: Compressor,
    },
}

impl NodeKind {
    fn timeline_mut(&mut self, kind: ParamKind) -> Option<&mut Timeline> {
        match (self, kind) {
            (NodeKind::Oscillator { frequency, .. }, ParamKind::Frequency) => Some(frequency),
            (NodeKind::Oscillator { detune, .. }, ParamKind::Detune) => Some(detune),
            (NodeKind::Gain { gain }, ParamKind::Gain) => Some(gain),
            (NodeKind::Filter { frequency, .. }, ParamKind::Frequency) => Some(frequency),
            (NodeKind::Filter { q, .. }, ParamKind::Q) => Some(q),
            _ => None,
        }
    }

    fn prune(&mut self, time: f64) {
        match self {
            NodeKind::Oscillator {
                frequency, detune, ..
            } => {
                frequency.prune_before(time);
                detune.prune_before(time);
            }
            NodeKind::Gain { gain } => gain.prune_before(time),
            NodeKind::Filter { frequency, q, .. } => {
                frequency.prune_before(time);
                q.prune_before(time);
            }
            NodeKind::Destination | NodeKind::Compressor { .. } => {}
        }
    }

    fn process(&mut self, input: f64, time: f64) -> f64 {
        match self {
            NodeKind::Destination => input,
            NodeKind::Oscillator {
                oscillator,
                frequency,
                detune,
                start,
                stop,
            } => {
                let started = start.is_some_and(|start| time >= start);
                let stopped = stop.is_some_and(|stop| time >= stop);
                if !started || stopped {
                    return 0.0;
                }
                oscillator.frequency = frequency.value_at(time);
                oscillator.detune = detune.value_at(time);
                oscillator.next_sample()
            }
            NodeKind::Gain { gain } => input * gain.value_at(time),
            NodeKind::Filter {
                filter,
                frequency,
                q,
            } => {
                filter.set_frequency(frequency.value_at(time));
                filter.set_q(q.value_at(time));
                filter.process(input)
            }
            NodeKind::Compressor { compressor } => compressor.process(input),
        }
    }
}

#[derive(Debug)]
struct RenderNode {
    kind: NodeKind,
    inputs: Vec<NodeId>,
    dispose_at: Option<f64>,
    cached_frame: u64,
    cached_output: f64,
}

impl RenderNode {
    fn new(kind: NodeKind) -> Self {
        RenderNode {
            kind,
            inputs: Vec::new(),
            dispose_at: None,
            cached_frame: u64::MAX,
            cached_output: 0.0,
        }
    }
}

/// Render-thread half of the audio graph.
#[derive(Debug)]
pub struct GraphRenderer {
    clock: Arc<GraphClock>,
    receiver: Receiver<GraphCommand>,
    nodes: HashMap<NodeId, RenderNode>,
    has_disposals: bool,
    // reused between blocks, so collecting disposed nodes doesn't allocate
    disposed: Vec<NodeId>,
}

impl GraphRenderer {
    fn new(clock: Arc<GraphClock>, receiver: Receiver<GraphCommand>) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(NodeId::DESTINATION, RenderNode::new(NodeKind::Destination));
        GraphRenderer {
            clock,
            receiver,
            nodes,
            has_disposals: false,
            disposed: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.clock.sample_rate
    }

    pub fn current_time(&self) -> f64 {
        self.clock.current_time()
    }

    /// Number of live nodes, the destination included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Render one block of mono output. A suspended graph outputs silence and
    /// does not advance the clock.
    pub fn render(&mut self, output: &mut [f32]) {
        self.apply_commands();

        if !self.clock.running.load(Ordering::Acquire) {
            output.fill(0.0);
            return;
        }

        let sample_rate = self.clock.sample_rate;
        let mut frame = self.clock.frames.load(Ordering::Acquire);
        for sample in output.iter_mut() {
            let time = frame as f64 / sample_rate;
            *sample = self.pull(NodeId::DESTINATION, frame, time) as f32;
            frame += 1;
        }
        self.clock.frames.store(frame, Ordering::Release);

        let now = frame as f64 / sample_rate;
        self.collect_disposed(now);
        for node in self.nodes.values_mut() {
            node.kind.prune(now);
        }
    }

    /// Render `frames` samples into a freshly allocated buffer.
    pub fn render_frames(&mut self, frames: usize) -> Vec<f32> {
        let mut buffer = vec![0.0; frames];
        self.render(&mut buffer);
        buffer
    }

    /// Drain every pending command from the control side.
    pub fn apply_commands(&mut self) {
        while let Ok(command) = self.receiver.try_recv() {
            self.apply_command(command);
        }
    }

    fn apply_command(&mut self, command: GraphCommand) {
        let sample_rate = self.clock.sample_rate;
        match command {
            GraphCommand::CreateOscillator {
                id,
                waveform,
                frequency,
                detune,
            } => {
                let kind = NodeKind::Oscillator {
                    oscillator: Oscillator::new(waveform, sample_rate),
                    frequency: Timeline::new(frequency),
                    detune: Timeline::new(detune),
                    start: None,
                    stop: None,
                };
                self.nodes.insert(id, RenderNode::new(kind));
            }
            GraphCommand::CreateGain { id, gain } => {
                let kind = NodeKind::Gain {
                    gain: Timeline::new(gain),
                };
                self.nodes.insert(id, RenderNode::new(kind));
            }
            GraphCommand::CreateFilter {
                id,
                filter_type,
                frequency,
                q,
            } => {
                let mut filter = BiquadFilter::new(filter_type, sample_rate);
                filter.set_frequency(frequency);
                filter.set_q(q);
                let kind = NodeKind::Filter {
                    filter,
                    frequency: Timeline::new(frequency),
                    q: Timeline::new(q),
                };
                self.nodes.insert(id, RenderNode::new(kind));
            }
            GraphCommand::CreateCompressor { id, config } => {
                let kind = NodeKind::Compressor {
                    compressor: Compressor::with_config(sample_rate, config),
                };
                self.nodes.insert(id, RenderNode::new(kind));
            }
            GraphCommand::Connect { from, to } => {
                if !self.nodes.contains_key(&from) {
                    return;
                }
                if let Some(node) = self.nodes.get_mut(&to) {
                    if !node.inputs.contains(&from) {
                        node.inputs.push(from);
                    }
                }
            }
            GraphCommand::Start { id, time } => {
                if let Some(RenderNode {
                    kind: NodeKind::Oscillator { start, .. },
                    ..
                }) = self.nodes.get_mut(&id)
                {
                    *start = Some(time);
                }
            }
            GraphCommand::Stop { id, time } => {
                if let Some(RenderNode {
                    kind: NodeKind::Oscillator { stop, .. },
                    ..
                }) = self.nodes.get_mut(&id)
                {
                    *stop = Some(time);
                }
            }
            GraphCommand::Dispose { id, time } => {
                if id == NodeId::DESTINATION {
                    return;
                }
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.dispose_at = Some(time);
                    self.has_disposals = true;
                }
            }
            GraphCommand::SetWaveform { id, waveform } => {
                if let Some(RenderNode {
                    kind: NodeKind::Oscillator { oscillator, .. },
                    ..
                }) = self.nodes.get_mut(&id)
                {
                    oscillator.waveform = waveform;
                }
            }
            GraphCommand::SetFilterType { id, filter_type } => {
                if let Some(RenderNode {
                    kind: NodeKind::Filter { filter, .. },
                    ..
                }) = self.nodes.get_mut(&id)
                {
                    filter.set_filter_type(filter_type);
                }
            }
            GraphCommand::Automate { param, event } => {
                if let Some(timeline) = self.timeline_mut(param) {
                    timeline.insert(event);
                }
            }
            GraphCommand::Cancel { param, time } => {
                if let Some(timeline) = self.timeline_mut(param) {
                    timeline.cancel_from(time);
                }
            }
        }
    }

    fn timeline_mut(&mut self, param: ParamId) -> Option<&mut Timeline> {
        self.nodes
            .get_mut(&param.node)
            .and_then(|node| node.kind.timeline_mut(param.kind))
    }

    /// Pull the output of `id` for `frame`, evaluating its inputs first.
    fn pull(&mut self, id: NodeId, frame: u64, time: f64) -> f64 {
        let input_count = match self.nodes.get_mut(&id) {
            Some(node) if node.cached_frame == frame => return node.cached_output,
            Some(node) => {
                // marks the node as visited, so cycles resolve to silence
                node.cached_frame = frame;
                node.cached_output = 0.0;
                node.inputs.len()
            }
            None => return 0.0,
        };

        let mut input = 0.0;
        for index in 0..input_count {
            let source = self
                .nodes
                .get(&id)
                .and_then(|node| node.inputs.get(index).copied());
            match source {
                Some(source) => input += self.pull(source, frame, time),
                None => break,
            }
        }

        match self.nodes.get_mut(&id) {
            Some(node) => {
                let output = node.kind.process(input, time);
                node.cached_output = output;
                output
            }
            None => 0.0,
        }
    }

    fn collect_disposed(&mut self, now: f64) {
        if !self.has_disposals {
            return;
        }
        self.disposed.clear();
        self.disposed.extend(
            self.nodes
                .iter()
                .filter(|(_, node)| node.dispose_at.is_some_and(|time| time <= now))
                .map(|(id, _)| *id),
        );
        if !self.disposed.is_empty() {
            for id in &self.disposed {
                self.nodes.remove(id);
            }
            let disposed = &self.disposed;
            for node in self.nodes.values_mut() {
                node.inputs.retain(|input| !disposed.contains(input));
            }
        }
        self.has_disposals = self.nodes.values().any(|node| node.dispose_at.is_some());
    }
}
