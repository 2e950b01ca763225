//! Configuration module - environment variable parsing and gameplay tuning

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origin for CORS (comma-separated)
    pub client_origin: String,
    /// Number of server-driven bots to keep in the arena
    pub bot_count: usize,
    /// Journal subsystem settings
    pub journal: JournalConfig,
    /// Gameplay tuning
    pub game: GameConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let bot_count = env::var("BOT_COUNT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);

        let game = GameConfig::default();
        game.validate()?;

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),
            bot_count,
            journal: JournalConfig::from_env(),
            game,
        })
    }
}

/// Journal subsystem configuration. All fields have env overrides so a
/// deployment can redirect or silence journaling without a rebuild.
#[derive(Clone, Debug)]
pub struct JournalConfig {
    /// Journaling disabled entirely (`DISABLE_JOURNAL`)
    pub disabled: bool,
    /// Verbose per-record logging (`DEBUG_JOURNAL`)
    pub debug: bool,
    /// Base directory for journal files (`JOURNALS_DIR`, else
    /// `EVENT_ARENA_ARTIFACTS_DIR/journals`, else `./journals`)
    pub base_dir: PathBuf,
    /// Entries at or above this count are written with the streaming path
    /// (`JOURNAL_STREAM_THRESHOLD`)
    pub stream_threshold: usize,
    /// Entries per streamed write batch
    pub stream_batch_size: usize,
    /// gzip journal files on disk
    pub compress: bool,
    /// Advisory in-memory flush point; a save is requested past this
    pub max_buffer_size: usize,
    /// Hard rotation point for a single journal
    pub max_journal_size: u64,
    /// Auto-save interval in milliseconds
    pub autosave_interval_ms: u64,
    /// Newest journals kept on startup cleanup
    pub keep_journals: usize,
}

impl JournalConfig {
    pub fn from_env() -> Self {
        let base_dir = env::var("JOURNALS_DIR")
            .map(PathBuf::from)
            .or_else(|_| {
                env::var("EVENT_ARENA_ARTIFACTS_DIR").map(|d| PathBuf::from(d).join("journals"))
            })
            .unwrap_or_else(|_| PathBuf::from("journals"));

        let stream_threshold = env::var("JOURNAL_STREAM_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10_000);

        Self {
            disabled: env::var("DISABLE_JOURNAL").is_ok(),
            debug: env::var("DEBUG_JOURNAL").is_ok(),
            base_dir,
            stream_threshold,
            stream_batch_size: 1000,
            compress: true,
            max_buffer_size: 1000,
            max_journal_size: 100_000,
            autosave_interval_ms: 30_000,
            keep_journals: 50,
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            debug: false,
            base_dir: PathBuf::from("journals"),
            stream_threshold: 10_000,
            stream_batch_size: 1000,
            compress: true,
            max_buffer_size: 1000,
            max_journal_size: 100_000,
            autosave_interval_ms: 30_000,
            keep_journals: 50,
        }
    }
}

/// World rectangle dimensions
#[derive(Clone, Copy, Debug)]
pub struct WorldConfig {
    pub width: f64,
    pub height: f64,
}

/// Player movement and body tuning
#[derive(Clone, Copy, Debug)]
pub struct PlayerConfig {
    pub hp: f64,
    pub speed: f64,
    pub radius: f64,
    /// Aim turn rate in radians per second
    pub turn_speed: f64,
}

/// Per-kind projectile tuning
#[derive(Clone, Copy, Debug)]
pub struct BulletConfig {
    pub damage: f64,
    pub lifetime_ms: u64,
    pub max_bounces: u32,
    pub damage_dropoff: f64,
    pub velocity_retention: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct PelletConfig {
    pub damage: f64,
    pub lifetime_ms: u64,
    pub max_bounces: u32,
    pub damage_dropoff: f64,
    pub velocity_retention: f64,
    pub count: u32,
    /// Half-spread in radians; pellets fan evenly across ±spread
    pub spread: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct RocketConfig {
    pub damage: f64,
    pub speed: f64,
    pub lifetime_ms: u64,
    pub hit_radius: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct ProjectileConfig {
    pub hit_radius: f64,
    pub base_speed: f64,
    pub bullet: BulletConfig,
    pub pellet: PelletConfig,
    pub rocket: RocketConfig,
}

#[derive(Clone, Copy, Debug)]
pub struct ExplosionConfig {
    pub radius: f64,
    pub damage: f64,
    pub knockback_power: f64,
}

/// Skill cooldowns in milliseconds
#[derive(Clone, Copy, Debug)]
pub struct CooldownConfig {
    pub shoot: u64,
    pub shotgun: u64,
    pub rocket: u64,
    pub dash: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct BuffConfig {
    pub haste_multiplier: f64,
    /// Fraction of incoming damage that still lands while shielded
    pub shield_reduction: f64,
    pub haste_default_duration_ms: u64,
    pub shield_default_duration_ms: u64,
    pub heal_amount: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct CombatConfig {
    pub knockback_duration_ms: u64,
    pub assist_time_window_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Positional dedup threshold for `player:move` broadcasts
    pub movement_threshold: f64,
    pub respawn_delay_ms: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct DashConfig {
    pub duration_ms: u64,
    pub factor: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct PickupConfig {
    pub spawn_interval_ms: u64,
    pub max_alive: usize,
    pub pick_radius: f64,
}

#[derive(Clone, Debug)]
pub struct MatchConfig {
    pub countdown_ms: u64,
    pub duration_ms: Option<u64>,
    /// Delay after `match:ended` before the match slot clears
    pub clear_delay_ms: u64,
    /// Start a fresh demo match after the slot clears
    pub auto_restart: bool,
    pub mode: String,
}

/// Full gameplay tuning. Defaults are the shipped game; a fork can build one
/// by hand and validate it before wiring the engine.
#[derive(Clone, Debug)]
pub struct GameConfig {
    pub world: WorldConfig,
    pub player: PlayerConfig,
    pub projectiles: ProjectileConfig,
    pub explosions: ExplosionConfig,
    pub cooldowns: CooldownConfig,
    pub buffs: BuffConfig,
    pub combat: CombatConfig,
    pub dash: DashConfig,
    pub pickups: PickupConfig,
    pub arena_match: MatchConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            world: WorldConfig {
                width: 2000.0,
                height: 1200.0,
            },
            player: PlayerConfig {
                hp: 100.0,
                speed: 220.0,
                radius: 16.0,
                turn_speed: 10.0,
            },
            projectiles: ProjectileConfig {
                hit_radius: 12.0,
                base_speed: 520.0,
                bullet: BulletConfig {
                    damage: 25.0,
                    lifetime_ms: 1800,
                    max_bounces: 3,
                    damage_dropoff: 0.8,
                    velocity_retention: 0.9,
                },
                pellet: PelletConfig {
                    damage: 17.0,
                    lifetime_ms: 700,
                    max_bounces: 2,
                    damage_dropoff: 0.7,
                    velocity_retention: 0.85,
                    count: 5,
                    spread: 0.26,
                },
                rocket: RocketConfig {
                    damage: 35.0,
                    speed: 380.0,
                    lifetime_ms: 2500,
                    hit_radius: 18.0,
                },
            },
            explosions: ExplosionConfig {
                radius: 120.0,
                damage: 40.0,
                knockback_power: 3.0,
            },
            cooldowns: CooldownConfig {
                shoot: 300,
                shotgun: 900,
                rocket: 1500,
                dash: 2500,
            },
            buffs: BuffConfig {
                haste_multiplier: 1.6,
                shield_reduction: 0.5,
                haste_default_duration_ms: 5000,
                shield_default_duration_ms: 5000,
                heal_amount: 35.0,
            },
            combat: CombatConfig {
                knockback_duration_ms: 150,
                assist_time_window_ms: 5000,
                heartbeat_interval_ms: 300,
                movement_threshold: 0.05,
                respawn_delay_ms: 5000,
            },
            dash: DashConfig {
                duration_ms: 220,
                factor: 2.5,
            },
            pickups: PickupConfig {
                spawn_interval_ms: 5000,
                max_alive: 12,
                pick_radius: 20.0,
            },
            arena_match: MatchConfig {
                countdown_ms: 3000,
                duration_ms: Some(180_000),
                clear_delay_ms: 10_000,
                auto_restart: true,
                mode: "demo".to_string(),
            },
        }
    }
}

impl GameConfig {
    /// Validate every constraint, collecting all violations into one error so
    /// a misconfigured deployment fails once with the full list.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut violations = Vec::new();

        if self.world.width <= 0.0 || self.world.height <= 0.0 {
            violations.push("world.width and world.height must be positive".to_string());
        }
        if self.player.hp <= 0.0 {
            violations.push("player.hp must be positive".to_string());
        }
        if self.player.speed <= 0.0 {
            violations.push("player.speed must be positive".to_string());
        }
        if self.player.radius <= 0.0 {
            violations.push("player.radius must be positive".to_string());
        }
        if self.player.turn_speed <= 0.0 {
            violations.push("player.turn_speed must be positive".to_string());
        }
        if self.projectiles.hit_radius <= 0.0 || self.projectiles.base_speed <= 0.0 {
            violations
                .push("projectiles.hit_radius and base_speed must be positive".to_string());
        }

        for (name, dropoff, retention) in [
            (
                "bullet",
                self.projectiles.bullet.damage_dropoff,
                self.projectiles.bullet.velocity_retention,
            ),
            (
                "pellet",
                self.projectiles.pellet.damage_dropoff,
                self.projectiles.pellet.velocity_retention,
            ),
        ] {
            if !(0.0..=1.0).contains(&dropoff) {
                violations.push(format!("{name}.damage_dropoff must be in [0, 1]"));
            }
            if !(0.0..=1.0).contains(&retention) {
                violations.push(format!("{name}.velocity_retention must be in [0, 1]"));
            }
        }

        if self.projectiles.pellet.count == 0 {
            violations.push("pellet.count must be positive".to_string());
        }
        if self.projectiles.rocket.speed <= 0.0 || self.projectiles.rocket.hit_radius <= 0.0 {
            violations.push("rocket.speed and rocket.hit_radius must be positive".to_string());
        }

        for (name, cd) in [
            ("shoot", self.cooldowns.shoot),
            ("shotgun", self.cooldowns.shotgun),
            ("rocket", self.cooldowns.rocket),
            ("dash", self.cooldowns.dash),
        ] {
            if cd == 0 {
                violations.push(format!("cooldowns.{name} must be positive"));
            }
        }

        if !(0.0..=1.0).contains(&self.buffs.shield_reduction) {
            violations.push("buffs.shield_reduction must be in [0, 1]".to_string());
        }
        if self.buffs.haste_multiplier <= 0.0 {
            violations.push("buffs.haste_multiplier must be positive".to_string());
        }
        if self.explosions.radius <= 0.0 {
            violations.push("explosions.radius must be positive".to_string());
        }
        if self.combat.heartbeat_interval_ms == 0 {
            violations.push("combat.heartbeat_interval_ms must be positive".to_string());
        }
        if self.pickups.max_alive == 0 {
            violations.push("pickups.max_alive must be positive".to_string());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::InvalidGameConfig(violations.join("; ")))
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid game configuration: {0}")]
    InvalidGameConfig(String),
}
