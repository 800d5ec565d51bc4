use bincode::{deserialize, serialize};
use clap::Parser;
use shared::{Packet, PlayerId, Vec3, WeaponVariant, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

/// Two scripted players that duel each other on a running server
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: SocketAddr,
    /// Blade colour of the first bot; unknown names fall back to blue
    #[clap(long, default_value = "blue")]
    jedi_color: String,
    /// Blade colour of the second bot
    #[clap(long, default_value = "red")]
    sith_color: String,
}

struct Bot {
    name: &'static str,
    socket: UdpSocket,
    server: SocketAddr,
    id: PlayerId,
}

impl Bot {
    async fn connect(
        name: &'static str,
        server: SocketAddr,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        println!("[{}] socket bound to {}", name, socket.local_addr()?);

        let data = serialize(&Packet::Connect {
            client_version: PROTOCOL_VERSION,
        })?;
        socket.send_to(&data, server).await?;

        let mut buf = [0u8; 2048];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf)).await??;
        match deserialize::<Packet>(&buf[..len])? {
            Packet::Connected { client_id } => {
                println!("[{}] connected as {}", name, client_id);
                Ok(Self {
                    name,
                    socket,
                    server,
                    id: client_id,
                })
            }
            other => Err(format!("[{}] expected Connected, got {:?}", name, other).into()),
        }
    }

    async fn send(&self, packet: Packet) -> Result<(), Box<dyn std::error::Error>> {
        println!("[{}] -> {:?}", self.name, packet);
        self.socket.send_to(&serialize(&packet)?, self.server).await?;
        Ok(())
    }

    /// Prints everything the server sends until `quiet` passes without a packet
    async fn drain(&self, quiet: Duration) -> Vec<Packet> {
        let mut buf = [0u8; 2048];
        let mut received = Vec::new();
        while let Ok(Ok((len, _))) = timeout(quiet, self.socket.recv_from(&mut buf)).await {
            match deserialize::<Packet>(&buf[..len]) {
                Ok(Packet::Light { .. }) => {}
                Ok(packet) => {
                    println!("[{}] <- {:?}", self.name, packet);
                    received.push(packet);
                }
                Err(e) => println!("[{}] undecodable packet: {}", self.name, e),
            }
        }
        received
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let jedi = Bot::connect("jedi", args.server).await?;
    let sith = Bot::connect("sith", args.server).await?;

    jedi.send(Packet::Pose {
        position: Vec3::new(0.0, 64.0, 0.0),
        facing: Vec3::new(1.0, 0.0, 0.0),
    })
    .await?;
    sith.send(Packet::Pose {
        position: Vec3::new(2.0, 64.0, 0.0),
        facing: Vec3::new(-1.0, 0.0, 0.0),
    })
    .await?;

    jedi.send(Packet::ListVariants).await?;
    for packet in jedi.drain(Duration::from_millis(300)).await {
        if let Packet::Variants { entries } = packet {
            for entry in entries {
                println!("  {:<8} {:<14} {}", entry.name, entry.lore, entry.color);
            }
        }
    }

    jedi.send(Packet::Give {
        variant: WeaponVariant::from_name(&args.jedi_color),
        target: None,
    })
    .await?;
    sith.send(Packet::Give {
        variant: WeaponVariant::from_name(&args.sith_color),
        target: None,
    })
    .await?;
    jedi.send(Packet::Toggle).await?;
    sith.send(Packet::Toggle).await?;

    jedi.send(Packet::Challenge { target: sith.id }).await?;
    sith.drain(Duration::from_millis(300)).await;
    sith.send(Packet::Accept).await?;

    // Countdown runs for four seconds
    sleep(Duration::from_secs(4)).await;
    jedi.drain(Duration::from_millis(300)).await;

    let mut health = 20.0;
    for round in 1..=10 {
        jedi.send(Packet::Swing).await?;
        jedi.send(Packet::Strike {
            target: Some(sith.id),
            damage: 8.0,
            target_health: health,
        })
        .await?;

        let replies = jedi.drain(Duration::from_millis(300)).await;
        let resolved = replies.iter().find_map(|packet| match packet {
            Packet::StrikeResolved {
                damage, duel_ended, ..
            } => Some((*damage, *duel_ended)),
            _ => None,
        });

        if let Some((damage, duel_ended)) = resolved {
            health -= damage;
            println!("Round {}: dealt {:.1}, sith at {:.1}", round, damage, health);
            if duel_ended {
                println!("Duel over");
                break;
            }
        }
    }

    sith.drain(Duration::from_millis(300)).await;

    jedi.send(Packet::Disconnect).await?;
    sith.send(Packet::Disconnect).await?;
    println!("Test client finished");

    Ok(())
}
