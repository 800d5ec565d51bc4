//! UDP host: packet dispatch into the extension and effect routing back out

use crate::client_manager::{ClientManager, CLIENT_TIMEOUT};
use crate::config::ExtensionConfig;
use crate::extension::LightsaberExtension;
use crate::host::{
    EffectError, Effects, Inventory, LightBackend, LightHandle, PlayerDirectory, PlayerPose,
    SystemClock,
};
use crate::scheduler::{spawn_sweeper, spawn_ticker};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{
    DuelNotice, LightState, Packet, PlayerId, Rgb, TitleCard, TitleTiming, Vec3, WeaponVariant,
    PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: PlayerId },
    Shutdown,
}

/// Messages sent from the extension side to the network sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<PlayerId>,
    },
}

type Roster = Arc<RwLock<ClientManager>>;

// Guards are never held across an await point or a call into the extension
fn read_roster(clients: &RwLock<ClientManager>) -> RwLockReadGuard<'_, ClientManager> {
    clients.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_roster(clients: &RwLock<ClientManager>) -> RwLockWriteGuard<'_, ClientManager> {
    clients.write().unwrap_or_else(PoisonError::into_inner)
}

/// The extension's view of the connected clients
///
/// Implements every collaborator trait on top of the client roster. Effects
/// become packets queued for the sender task.
pub struct NetworkHost {
    clients: Roster,
    outbox: mpsc::UnboundedSender<GameMessage>,
}

impl NetworkHost {
    pub fn new(clients: Roster, outbox: mpsc::UnboundedSender<GameMessage>) -> Self {
        Self { clients, outbox }
    }

    pub fn send_to(&self, player: PlayerId, packet: Packet) {
        let Some(addr) = read_roster(&self.clients).addr_of(player) else {
            debug!("Dropping packet for offline {}", player);
            return;
        };
        if let Err(e) = self.outbox.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    pub fn broadcast(&self, packet: Packet, exclude: Option<PlayerId>) {
        if let Err(e) = self
            .outbox
            .send(GameMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }
}

impl PlayerDirectory for NetworkHost {
    fn locate(&self, player: PlayerId) -> Option<PlayerPose> {
        read_roster(&self.clients).pose(player)
    }
}

impl Inventory for NetworkHost {
    fn held_item(&self, player: PlayerId) -> Option<String> {
        read_roster(&self.clients).held_item(player)
    }

    fn set_blade_flag(&self, player: PlayerId, active: bool) {
        let updated = write_roster(&self.clients).set_blade_flag(player, active);
        if updated {
            self.send_to(player, Packet::BladeFlag { active });
        }
    }

    fn give_item(&self, player: PlayerId, item_id: &str, variant: WeaponVariant) -> bool {
        let given = write_roster(&self.clients).give_item(player, item_id);
        if given {
            self.send_to(
                player,
                Packet::ItemGranted {
                    item_id: item_id.to_string(),
                    variant,
                },
            );
        }
        given
    }
}

impl Effects for NetworkHost {
    fn play_sound(&self, at: Vec3, key: &str, volume: f32, pitch: f32) {
        self.broadcast(
            Packet::Sound {
                at: Some(at),
                key: key.to_string(),
                volume,
                pitch,
            },
            None,
        );
    }

    fn play_sound_to(&self, player: PlayerId, key: &str, volume: f32, pitch: f32) {
        self.send_to(
            player,
            Packet::Sound {
                at: None,
                key: key.to_string(),
                volume,
                pitch,
            },
        );
    }

    fn stop_sound(&self, player: PlayerId, key: &str) {
        self.send_to(player, Packet::StopSound { key: key.to_string() });
    }

    fn spawn_particles(&self, at: Vec3, key: &str, count: u32, spread: Vec3, speed: f64) {
        self.broadcast(
            Packet::Particles {
                at,
                key: key.to_string(),
                count,
                spread,
                speed,
            },
            None,
        );
    }

    fn play_animation(&self, player: PlayerId, key: &str) {
        self.broadcast(
            Packet::Animation {
                player,
                key: key.to_string(),
            },
            None,
        );
    }

    fn apply_velocity(&self, player: PlayerId, velocity: Vec3) {
        self.send_to(player, Packet::Velocity { velocity });
    }

    fn show_title(&self, player: PlayerId, card: TitleCard, timing: TitleTiming) {
        self.send_to(player, Packet::Title { card, timing });
    }

    fn notify(&self, player: PlayerId, notice: DuelNotice) {
        self.send_to(player, Packet::Notice { notice });
    }
}

impl LightBackend for NetworkHost {
    fn create_light(
        &self,
        at: Vec3,
        color: Rgb,
        radius: i32,
        intensity: f32,
    ) -> Result<Box<dyn LightHandle>, EffectError> {
        Ok(Box::new(RemoteLight {
            owner: None,
            state: LightState {
                position: at,
                color,
                radius,
                intensity,
            },
            outbox: self.outbox.clone(),
        }))
    }
}

/// A light that lives on the clients
///
/// Nothing is sent until the light is attached to a player. After that every
/// change is broadcast as a full [`LightState`].
pub struct RemoteLight {
    owner: Option<PlayerId>,
    state: LightState,
    outbox: mpsc::UnboundedSender<GameMessage>,
}

impl RemoteLight {
    fn publish(&self) -> Result<(), EffectError> {
        let Some(owner) = self.owner else {
            return Ok(());
        };
        self.outbox
            .send(GameMessage::BroadcastPacket {
                packet: Packet::Light {
                    owner,
                    light: self.state,
                },
                exclude: None,
            })
            .map_err(|_| EffectError::Rejected("network sender stopped".to_string()))
    }
}

impl LightHandle for RemoteLight {
    fn set_position(&mut self, at: Vec3) -> Result<(), EffectError> {
        self.state.position = at;
        self.publish()
    }

    fn set_intensity(&mut self, intensity: f32) -> Result<(), EffectError> {
        if self.state.intensity == intensity {
            return Ok(());
        }
        self.state.intensity = intensity;
        self.publish()
    }

    fn set_radius(&mut self, radius: i32) -> Result<(), EffectError> {
        if self.state.radius == radius {
            return Ok(());
        }
        self.state.radius = radius;
        self.publish()
    }

    fn follow_entity(&mut self, player: PlayerId) -> Result<(), EffectError> {
        self.owner = Some(player);
        self.publish()
    }

    fn remove(self: Box<Self>) {
        if let Some(owner) = self.owner {
            let _ = self.outbox.send(GameMessage::BroadcastPacket {
                packet: Packet::LightRemoved { owner },
                exclude: None,
            });
        }
    }
}

/// Main server tying the UDP socket to the lightsaber extension
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Roster,
    host: Arc<NetworkHost>,
    extension: Arc<LightsaberExtension>,
    tick_duration: Duration,
    sweep_period: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        max_clients: usize,
        config: ExtensionConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        let clients = Arc::new(RwLock::new(ClientManager::new(max_clients)));
        let host = Arc::new(NetworkHost::new(Arc::clone(&clients), game_tx));

        let tick_duration = Duration::from_millis(config.tick_period_ms);
        let sweep_period = Duration::from_millis(config.sweep_period_ms);
        let extension = Arc::new(LightsaberExtension::new(
            config,
            Arc::new(SystemClock),
            Arc::clone(&host),
        )?);

        Ok(Server {
            socket,
            clients,
            host,
            extension,
            tick_duration,
            sweep_period,
            server_tx,
            server_rx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn extension(&self) -> Arc<LightsaberExtension> {
        Arc::clone(&self.extension)
    }

    /// Sender that can stop the main loop with [`ServerMessage::Shutdown`]
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = read_roster(&clients).get_client_addrs();

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = write_roster(&clients).check_timeouts(CLIENT_TIMEOUT);

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.host.outbox.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Handles a packet from `addr`, connecting the sender first if needed
    fn handle_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect { client_version } = packet {
            self.handle_connect(client_version, addr);
            return;
        }

        let Some(client_id) = write_roster(&self.clients).touch_by_addr(addr) else {
            warn!("Packet from unknown address {}", addr);
            return;
        };
        self.handle_client_packet(client_id, packet);
    }

    fn handle_connect(&self, client_version: u32, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            let reason = "Protocol version mismatch".to_string();
            self.send_packet(Packet::Disconnected { reason }, addr);
            return;
        }

        // Remove existing connection if present
        let existing = {
            let mut clients = write_roster(&self.clients);
            let existing = clients.find_client_by_addr(addr);
            if let Some(existing_id) = existing {
                info!("Removing existing client {} from {}", existing_id, addr);
                clients.remove_client(&existing_id);
            }
            existing
        };
        if let Some(existing_id) = existing {
            self.extension.on_disconnect(existing_id);
        }

        let client_id = write_roster(&self.clients).add_client(addr);
        let response = match client_id {
            Some(client_id) => Packet::Connected { client_id },
            None => Packet::Disconnected {
                reason: "Server full".to_string(),
            },
        };
        self.send_packet(response, addr);
    }

    /// Translates one packet from a connected client into extension calls
    fn handle_client_packet(&self, client_id: PlayerId, packet: Packet) {
        let ext = &self.extension;

        match packet {
            Packet::Pose { position, facing } => {
                write_roster(&self.clients).set_pose(client_id, PlayerPose::new(position, facing));
            }

            Packet::Hold { item } => {
                let switched = write_roster(&self.clients).set_held_item(client_id, item);
                match switched {
                    Ok(previous) => {
                        ext.on_item_switched(client_id, previous.as_deref());
                    }
                    Err(e) => warn!("Rejected hold from {}: {}", client_id, e),
                }
            }

            Packet::Toggle => {
                if ext.toggle(client_id).is_none() {
                    debug!("{} toggled without a weapon in hand", client_id);
                }
            }

            Packet::Swing => {
                ext.on_swing(client_id);
            }

            Packet::Strike {
                target,
                damage,
                target_health,
            } => {
                let outcome = ext.on_strike(client_id, target, damage, target_health);
                self.host.send_to(
                    client_id,
                    Packet::StrikeResolved {
                        kind: outcome.kind,
                        damage: outcome.damage,
                        duel_ended: outcome.duel_ended,
                    },
                );
            }

            Packet::Challenge { target } => {
                if let Err(reason) = ext.request_duel(client_id, target) {
                    self.host.send_to(client_id, Packet::Rejected { reason });
                }
            }

            Packet::Accept => {
                if let Err(reason) = ext.accept(client_id) {
                    self.host.send_to(client_id, Packet::Rejected { reason });
                }
            }

            Packet::Decline => {
                if let Err(reason) = ext.decline(client_id) {
                    self.host.send_to(client_id, Packet::Rejected { reason });
                }
            }

            Packet::Give { variant, target } => {
                let recipient = target.unwrap_or(client_id);
                if !ext.give_weapon(recipient, variant) {
                    warn!("Could not give {:?} blade to {}", variant, recipient);
                }
            }

            Packet::ListVariants => {
                self.host.send_to(
                    client_id,
                    Packet::Variants {
                        entries: ext.variant_catalogue(),
                    },
                );
            }

            Packet::Died => {
                ext.on_death(client_id);
            }

            Packet::Respawned => {
                ext.on_respawn(client_id);
            }

            Packet::Disconnect => {
                let removed = write_roster(&self.clients).remove_client(&client_id);
                if removed {
                    ext.on_disconnect(client_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from client {}", client_id);
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();
        let ticker = spawn_ticker(Arc::clone(&self.extension), self.tick_duration);
        let sweeper = spawn_sweeper(Arc::clone(&self.extension), self.sweep_period);

        info!("Server started successfully");

        // Handle network events
        while let Some(message) = self.server_rx.recv().await {
            match message {
                ServerMessage::PacketReceived { packet, addr } => {
                    self.handle_packet(packet, addr);
                }
                ServerMessage::ClientTimeout { client_id } => {
                    self.extension.on_disconnect(client_id);
                }
                ServerMessage::Shutdown => break,
            }
        }
        info!(
            "Server shutting down: {} clients, {} active duels",
            read_roster(&self.clients).len(),
            self.extension.duels().duel_count()
        );

        ticker.abort();
        sweeper.abort();
        self.extension.shutdown();
        self.host.broadcast(
            Packet::Disconnected {
                reason: "Server shutting down".to_string(),
            },
            None,
        );
        Ok(())
    }
}
