//! Simulated content: star systems and the bodies moving inside them.
//!
//! Bodies and systems live in two arenas addressed by [`BodyId`] and
//! [`SystemId`]. A body belongs to exactly one system and only feels the
//! gravity of the other members of that system. Body positions are relative
//! to their system; system positions are galactic.

use crate::physics::{self, PointMass, Vector2};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fmt;

/// Longest stored name in characters, longer names are truncated.
pub const NAME_LENGTH_MAX: usize = 31;

pub const SOLAR_MASS: f64 = 1.9884e30;
pub const SOLAR_RADIUS: f64 = 6.957e8;

/// Generated systems are scattered over a disc of this radius in meters.
pub const GALAXY_RADIUS: f64 = 4.7e20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BodyId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SystemId(pub u32);

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Harvard classification of main sequence stars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpectralClass {
    M,
    K,
    G,
    F,
    A,
    B,
    O,
}

/// Mean and spread of a generated star property.
#[derive(Debug, Clone, Copy)]
struct Spread {
    mean: f64,
    deviation: f64,
}

impl Spread {
    const fn new(mean: f64, deviation: f64) -> Self {
        Self { mean, deviation }
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        let value = self.mean + self.deviation * rng.gen_range(-1.0..=1.0);
        value.max(0.1 * self.mean)
    }
}

impl SpectralClass {
    pub const ALL: [SpectralClass; 7] = [
        SpectralClass::M,
        SpectralClass::K,
        SpectralClass::G,
        SpectralClass::F,
        SpectralClass::A,
        SpectralClass::B,
        SpectralClass::O,
    ];

    /// Share of each class among generated stars, in [`SpectralClass::ALL`] order.
    const FREQUENCY: [f64; 7] = [0.7645, 0.121, 0.076, 0.03, 0.006, 0.0013, 0.0012];

    pub fn letter(self) -> char {
        match self {
            SpectralClass::M => 'M',
            SpectralClass::K => 'K',
            SpectralClass::G => 'G',
            SpectralClass::F => 'F',
            SpectralClass::A => 'A',
            SpectralClass::B => 'B',
            SpectralClass::O => 'O',
        }
    }

    /// Mass in solar masses.
    fn mass(self) -> Spread {
        match self {
            SpectralClass::M => Spread::new(0.3, 0.125),
            SpectralClass::K => Spread::new(0.8, 0.075),
            SpectralClass::G => Spread::new(1.1, 0.1),
            SpectralClass::F => Spread::new(1.7, 0.3),
            SpectralClass::A => Spread::new(3.2, 0.75),
            SpectralClass::B => Spread::new(18.0, 7.0),
            SpectralClass::O => Spread::new(60.0, 15.0),
        }
    }

    /// Radius in solar radii.
    fn radius(self) -> Spread {
        match self {
            SpectralClass::M => Spread::new(0.6, 0.05),
            SpectralClass::K => Spread::new(0.83, 0.065),
            SpectralClass::G => Spread::new(1.055, 0.0475),
            SpectralClass::F => Spread::new(1.275, 0.0625),
            SpectralClass::A => Spread::new(1.6, 0.1),
            SpectralClass::B => Spread::new(4.2, 1.2),
            SpectralClass::O => Spread::new(12.5, 2.95),
        }
    }

    /// Surface temperature in kelvin.
    fn temperature(self) -> Spread {
        match self {
            SpectralClass::M => Spread::new(3050.0, 325.0),
            SpectralClass::K => Spread::new(4450.0, 375.0),
            SpectralClass::G => Spread::new(5600.0, 200.0),
            SpectralClass::F => Spread::new(6750.0, 375.0),
            SpectralClass::A => Spread::new(8750.0, 625.0),
            SpectralClass::B => Spread::new(20000.0, 5000.0),
            SpectralClass::O => Spread::new(40000.0, 5000.0),
        }
    }

    fn pick(rng: &mut StdRng) -> SpectralClass {
        let mut roll = rng.gen_range(0.0..1.0);
        for (class, share) in Self::ALL.into_iter().zip(Self::FREQUENCY) {
            if roll < share {
                return class;
            }
            roll -= share;
        }
        SpectralClass::M
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StarData {
    pub spectral_class: SpectralClass,
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub id: BodyId,
    pub system: SystemId,
    pub name: String,
    pub radius: f64,
    pub motion: PointMass,
    pub star: Option<StarData>,
}

impl AsRef<PointMass> for Body {
    fn as_ref(&self) -> &PointMass {
        &self.motion
    }
}

impl AsMut<PointMass> for Body {
    fn as_mut(&mut self) -> &mut PointMass {
        &mut self.motion
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StarSystem {
    pub id: SystemId,
    pub name: String,
    pub position: Vector2,
    members: Vec<usize>,
}

impl StarSystem {
    pub fn body_ids(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.members.iter().map(|&index| BodyId(index as u32))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Truncates a name to [`NAME_LENGTH_MAX`] characters.
pub fn truncate_name(name: &str) -> String {
    name.chars().take(NAME_LENGTH_MAX).collect()
}

#[derive(Debug, Clone, Default)]
pub struct Galaxy {
    bodies: Vec<Body>,
    systems: Vec<StarSystem>,
    generation: u64,
}

impl Galaxy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sol plus `star_systems` generated single star systems.
    pub fn seeded(star_systems: usize, seed: u64) -> Self {
        let mut galaxy = Self::new();
        galaxy.reseed(star_systems, seed);
        galaxy
    }

    /// Replaces all content and bumps the generation counter.
    pub fn reseed(&mut self, star_systems: usize, seed: u64) {
        self.bodies.clear();
        self.systems.clear();
        self.generation += 1;

        self.add_sol();

        let mut rng = StdRng::seed_from_u64(seed);
        for n in 0..star_systems {
            let distance = GALAXY_RADIUS * rng.gen_range(0.0f64..1.0).sqrt();
            let angle = rng.gen_range(0.0..std::f64::consts::TAU);
            let position = Vector2::new(distance * angle.cos(), distance * angle.sin());
            let system = self.add_system(&format!("System_{}", n), position);

            let class = SpectralClass::pick(&mut rng);
            let mass = class.mass().sample(&mut rng) * SOLAR_MASS;
            let radius = class.radius().sample(&mut rng) * SOLAR_RADIUS;
            let temperature = class.temperature().sample(&mut rng);
            self.add_body(
                system,
                &format!("Star_{}", n),
                radius,
                PointMass {
                    mass,
                    ..PointMass::default()
                },
                Some(StarData {
                    spectral_class: class,
                    temperature,
                }),
            );
        }

        info!(
            "Galaxy generation {}: {} systems, {} bodies",
            self.generation,
            self.systems.len(),
            self.bodies.len()
        );
    }

    fn add_sol(&mut self) {
        let sol = self.add_system("Sol", Vector2::new(2.46e20, 0.0));
        self.add_body(
            sol,
            "Sun",
            6.96342e8,
            PointMass {
                mass: 1.9884e30,
                ..PointMass::default()
            },
            Some(StarData {
                spectral_class: SpectralClass::G,
                temperature: 5772.0,
            }),
        );
        self.add_body(
            sol,
            "Earth",
            6378137.0,
            PointMass {
                mass: 5.972e24,
                position: Vector2::new(0.0, -152.1e9),
                velocity: Vector2::new(29.29e3, 0.0),
                ..PointMass::default()
            },
            None,
        );
        self.add_body(
            sol,
            "Moon",
            1737.0e3,
            PointMass {
                mass: 7.346e22,
                position: Vector2::new(384400.0e3, -152.1e9),
                velocity: Vector2::new(29.29e3, 964.0),
                ..PointMass::default()
            },
            None,
        );
    }

    pub fn add_system(&mut self, name: &str, position: Vector2) -> SystemId {
        let id = SystemId(self.systems.len() as u32);
        self.systems.push(StarSystem {
            id,
            name: truncate_name(name),
            position,
            members: Vec::new(),
        });
        id
    }

    /// Adds a body to an existing system. Returns None for an unknown system.
    pub fn add_body(
        &mut self,
        system: SystemId,
        name: &str,
        radius: f64,
        motion: PointMass,
        star: Option<StarData>,
    ) -> Option<BodyId> {
        let index = self.bodies.len();
        let owner = self.systems.get_mut(system.0 as usize)?;
        owner.members.push(index);

        let id = BodyId(index as u32);
        self.bodies.push(Body {
            id,
            system,
            name: truncate_name(name),
            radius,
            motion,
            star,
        });
        Some(id)
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn systems(&self) -> &[StarSystem] {
        &self.systems
    }

    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id.0 as usize)
    }

    pub fn system(&self, id: SystemId) -> Option<&StarSystem> {
        self.systems.get(id.0 as usize)
    }

    pub fn contains_system(&self, id: SystemId) -> bool {
        self.system(id).is_some()
    }

    /// Bodies that carry star data.
    pub fn stars(&self) -> impl Iterator<Item = (&Body, &StarData)> + '_ {
        self.bodies
            .iter()
            .filter_map(|body| body.star.as_ref().map(|star| (body, star)))
    }

    /// Bodies of one system, empty for an unknown id.
    pub fn bodies_in(&self, id: SystemId) -> impl Iterator<Item = &Body> + '_ {
        self.system(id)
            .into_iter()
            .flat_map(move |system| system.members.iter().map(move |&i| &self.bodies[i]))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Advances all bodies by `dt` simulated seconds. Returns the sub-steps used.
    pub fn step(&mut self, dt: f64) -> u32 {
        if dt <= 0.0 || !dt.is_finite() {
            return 0;
        }
        let substeps = physics::calculate_required_substeps(dt);
        let substep_dt = dt / f64::from(substeps);

        for _ in 0..substeps {
            physics::clear_accelerations(&mut self.bodies);
            for system in &self.systems {
                physics::accumulate_gravity(&mut self.bodies, &system.members);
            }
            physics::integrate(&mut self.bodies, substep_dt);
        }
        substeps
    }
}
