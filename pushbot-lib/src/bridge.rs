use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::classifier::{StreamFrameClassifier, StreamItem};
use crate::command::Command;
use crate::control::{CommandRole, NeuronCommandMapper, NeuronCommandTable};
use crate::error::{ConfigurationError, ProtocolError, PushBotError, TransportError};
use crate::device::Device;
use crate::protocol::CommandId;
use crate::transport::{ChannelReceiver, ChannelSender, DuplexChannel, WireEncoding};

const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Callbacks for traffic coming from the robot. Called from the listener task.
pub trait BridgeHandler: Send + Sync + 'static {
    /// A retina event arrived for `neuron_id`.
    fn on_spike_injected(&self, neuron_id: u32) {
        trace!(neuron_id, "Spike injected");
    }

    /// The robot sent a line of text.
    fn on_text_report(&self, line: &str) {
        info!(line, "Robot report");
    }
}

/// Handler that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl BridgeHandler for LoggingHandler {}

#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub encoding: WireEncoding,
    pub recv_timeout: Duration,
    /// Control module neuron of each role
    pub neurons: BTreeMap<CommandRole, u8>,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            encoding: WireEncoding::default(),
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            neurons: BTreeMap::new(),
        }
    }
}

/// What happened to one outbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// The bridge is not between start and stop
    NotRunning,
    /// No device answers to the key
    Unmapped,
    /// The text link has no form for the command
    NoTextForm,
}

/// Why the listener task ended.
#[derive(Debug)]
pub enum ListenerExit {
    Shutdown,
    Disconnected(TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Running,
    Stopped,
}

/// Connects the command side of the network with a robot link.
///
/// Outbound commands are routed by key to the device that owns them and
/// written in the link's encoding. Inbound bytes are classified on a listener
/// task and handed to the [`BridgeHandler`].
pub struct LiveEventBridge<C: DuplexChannel> {
    devices: Vec<Device>,
    routes: HashMap<u32, CommandId>,
    neuron_table: NeuronCommandTable,
    encoding: WireEncoding,
    recv_timeout: Duration,
    state: BridgeState,
    sender: C::Sender,
    receiver: Option<C::Receiver>,
    classifier: Option<StreamFrameClassifier>,
    handler: Arc<dyn BridgeHandler>,
    shutdown: Arc<AtomicBool>,
    listener: Option<JoinHandle<ListenerExit>>,
}

impl<C: DuplexChannel> LiveEventBridge<C> {
    pub fn new(
        channel: C,
        devices: Vec<Device>,
        handler: Arc<dyn BridgeHandler>,
        options: BridgeOptions,
    ) -> Result<Self, ConfigurationError> {
        let mut routes = HashMap::new();
        for device in &devices {
            for &(key, id) in device.command_keys() {
                match routes.entry(key) {
                    Entry::Vacant(slot) => {
                        slot.insert(id);
                    }
                    Entry::Occupied(slot) if *slot.get() != id => {
                        return Err(ConfigurationError::KeyCollision {
                            key,
                            first: slot.get().name(),
                            second: id.name(),
                        });
                    }
                    Entry::Occupied(_) => {}
                }
            }
        }

        let neuron_table = NeuronCommandMapper::build(&options.neurons, devices.as_slice())?;
        let format = devices
            .iter()
            .find_map(Device::retina_format)
            .unwrap_or_default();
        let (sender, receiver) = channel.split();

        Ok(Self {
            devices,
            routes,
            neuron_table,
            encoding: options.encoding,
            recv_timeout: options.recv_timeout,
            state: BridgeState::Idle,
            sender,
            receiver: Some(receiver),
            classifier: Some(StreamFrameClassifier::new(format)),
            handler,
            shutdown: Arc::new(AtomicBool::new(false)),
            listener: None,
        })
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Neuron to command assignments of the control module.
    pub fn device_command_table(&self) -> &NeuronCommandTable {
        &self.neuron_table
    }

    /// Send every device's start commands, then start listening.
    pub async fn start(&mut self) -> Result<(), PushBotError> {
        match self.state {
            BridgeState::Running => return Ok(()),
            BridgeState::Stopped => return Err(TransportError::Closed.into()),
            BridgeState::Idle => {}
        }

        let commands = lifecycle_commands(&self.devices, Device::start_resume_commands);
        for (id, command) in commands {
            self.transmit_lifecycle(id, command).await?;
        }

        let (Some(receiver), Some(classifier)) = (self.receiver.take(), self.classifier.take()) else {
            return Err(TransportError::Closed.into());
        };
        self.listener = Some(tokio::spawn(listen(
            receiver,
            classifier,
            self.handler.clone(),
            self.shutdown.clone(),
            self.recv_timeout,
        )));
        self.state = BridgeState::Running;
        info!(devices = self.devices.len(), "Bridge started");
        Ok(())
    }

    /// Send every device's pause commands, close the link and wait for the
    /// listener. Returns how the listener ended, if it was running.
    pub async fn stop(&mut self) -> Result<Option<ListenerExit>, PushBotError> {
        match self.state {
            BridgeState::Stopped => return Ok(None),
            BridgeState::Idle => {
                self.state = BridgeState::Stopped;
                self.sender.close().await?;
                return Ok(None);
            }
            BridgeState::Running => {}
        }
        self.state = BridgeState::Stopped;

        let mut first_error = None;
        let commands = lifecycle_commands(&self.devices, Device::pause_stop_commands);
        for (id, command) in commands {
            if let Err(e) = self.transmit_lifecycle(id, command).await {
                warn!("Failed to send pause command {}: {}", id, e);
                first_error = first_error.or(Some(e));
            }
        }

        self.shutdown.store(true, Ordering::Release);
        if let Err(e) = self.sender.close().await {
            first_error = first_error.or(Some(e));
        }

        let exit = match self.listener.take() {
            Some(handle) => match handle.await {
                Ok(exit) => Some(exit),
                Err(e) => {
                    warn!("Listener task failed: {}", e);
                    None
                }
            },
            None => None,
        };
        info!(?exit, "Bridge stopped");

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(exit),
        }
    }

    /// [`stop`](Self::stop), consuming the bridge.
    pub async fn close(mut self) -> Result<Option<ListenerExit>, PushBotError> {
        self.stop().await
    }

    /// Forward a command from the network to the robot.
    pub async fn send_command(&mut self, key: u32, payload: Option<u32>) -> Result<Delivery, PushBotError> {
        if self.state != BridgeState::Running {
            debug!(key, "Bridge not running, command dropped");
            return Ok(Delivery::NotRunning);
        }
        let Some(&id) = self.routes.get(&key) else {
            warn!("{}, command dropped", ProtocolError::UnknownCommandKey(key));
            return Ok(Delivery::Unmapped);
        };

        let delivery = self.transmit(id, key, payload).await?;
        if delivery == Delivery::NoTextForm {
            warn!(command = %id, "Command has no text form, dropped");
        }
        Ok(delivery)
    }

    /// Forward the command driven by a control module neuron.
    pub async fn send_neuron_command(&mut self, neuron_id: u8, payload: Option<u32>) -> Result<Delivery, PushBotError> {
        match self.neuron_table.neuron_to_key(neuron_id) {
            Some(key) => self.send_command(key, payload).await,
            None => {
                warn!(neuron_id, "Neuron drives no command, dropped");
                Ok(Delivery::Unmapped)
            }
        }
    }

    async fn transmit_lifecycle(&mut self, id: CommandId, command: Command) -> Result<(), TransportError> {
        if self.transmit(id, command.key, command.payload).await? == Delivery::NoTextForm {
            debug!(command = %id, "Skipping command without text form");
        }
        Ok(())
    }

    async fn transmit(&mut self, id: CommandId, key: u32, payload: Option<u32>) -> Result<Delivery, TransportError> {
        let Some(frame) = self.encoding.encode(id, key, payload) else {
            return Ok(Delivery::NoTextForm);
        };
        debug!(command = %id, bytes = %hex::encode(&frame), "Sending");
        self.sender.send(frame).await?;
        Ok(Delivery::Sent)
    }
}

/// Commands of every device in registration order, paired with what they are.
fn lifecycle_commands(devices: &[Device], list: fn(&Device) -> &[Command]) -> Vec<(CommandId, Command)> {
    devices
        .iter()
        .flat_map(|device| {
            list(device)
                .iter()
                .filter_map(move |command| device.command_id(command.key).map(|id| (id, *command)))
        })
        .collect()
}

async fn listen<R: ChannelReceiver>(
    mut receiver: R,
    mut classifier: StreamFrameClassifier,
    handler: Arc<dyn BridgeHandler>,
    shutdown: Arc<AtomicBool>,
    recv_timeout: Duration,
) -> ListenerExit {
    loop {
        if shutdown.load(Ordering::Acquire) {
            return ListenerExit::Shutdown;
        }
        match receiver.recv(recv_timeout).await {
            Ok(None) => continue,
            Ok(Some(data)) => {
                debug!(bytes = %hex::encode(&data), "Received");
                for item in classifier.feed(&data) {
                    match item {
                        StreamItem::Event(event) => handler.on_spike_injected(event.neuron_index),
                        StreamItem::Line(line) => handler.on_text_report(&line),
                        StreamItem::Malformed(e) => warn!("{}, dropped", e),
                    }
                }
            }
            Err(e) => {
                if shutdown.load(Ordering::Acquire) {
                    return ListenerExit::Shutdown;
                }
                warn!("Robot link lost: {}", e);
                return ListenerExit::Disconnected(e);
            }
        }
    }
}
