use serde::Serialize;

/// Gravitational constant in m³ kg⁻¹ s⁻².
pub const GRAVITATIONAL_CONSTANT: f64 = 6.6743e-11;
/// Lower bound for squared distances in m², keeps close encounters finite.
pub const MIN_DISTANCE_SQUARED: f64 = 1.0e6;
/// Longest simulated interval integrated in one step, in seconds.
pub const MAX_SUBSTEP_SECONDS: f64 = 3600.0;
pub const MAX_SUBSTEPS: u32 = 64;

///Represents a vector in 2D space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct Vector2 {
    pub x: f64,
    pub y: f64,
}

impl Vector2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    ///Returns the squared magnitude of the vector.
    pub fn magnitude_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f64 {
        self.magnitude_squared().sqrt()
    }

    ///Returns the normalized vector.
    pub fn normalize(&self) -> Vector2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vector2::default()
        } else {
            self.scale(1.0 / mag)
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f64) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    ///Returns the difference of two vectors.
    pub fn sub(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

///Kinematic state of a body under gravity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct PointMass {
    pub mass: f64,
    pub position: Vector2,
    pub velocity: Vector2,
    pub acceleration: Vector2,
}

impl AsRef<PointMass> for PointMass {
    fn as_ref(&self) -> &PointMass {
        self
    }
}

impl AsMut<PointMass> for PointMass {
    fn as_mut(&mut self) -> &mut PointMass {
        self
    }
}

/// Zeroes the acceleration of every body.
pub fn clear_accelerations<T: AsMut<PointMass>>(bodies: &mut [T]) {
    for body in bodies {
        body.as_mut().acceleration = Vector2::default();
    }
}

/// Adds the pairwise gravitational accelerations between `members`.
///
/// `members` are indices into `bodies`. Only pairs within the list interact,
/// which is how star systems are kept independent of each other.
pub fn accumulate_gravity<T>(bodies: &mut [T], members: &[usize])
where
    T: AsRef<PointMass> + AsMut<PointMass>,
{
    for (n, &i) in members.iter().enumerate() {
        for &j in &members[n + 1..] {
            let (p_i, m_i) = {
                let body = bodies[i].as_ref();
                (body.position, body.mass)
            };
            let (p_j, m_j) = {
                let body = bodies[j].as_ref();
                (body.position, body.mass)
            };

            let diff = p_i.sub(&p_j);
            let r_sqr = diff.magnitude_squared().max(MIN_DISTANCE_SQUARED);
            let direction = diff.normalize();
            let pull = direction.scale(GRAVITATIONAL_CONSTANT / r_sqr);

            let a_i = &mut bodies[i].as_mut().acceleration;
            *a_i = a_i.sub(&pull.scale(m_j));
            let a_j = &mut bodies[j].as_mut().acceleration;
            *a_j = a_j.add(&pull.scale(m_i));
        }
    }
}

/// Semi-implicit Euler step: velocity first, then position with the new velocity.
pub fn integrate<T: AsMut<PointMass>>(bodies: &mut [T], dt: f64) {
    for body in bodies {
        let body = body.as_mut();
        body.velocity = body.velocity.add(&body.acceleration.scale(dt));
        body.position = body.position.add(&body.velocity.scale(dt));
    }
}

/// Number of equal sub-steps needed to integrate `dt` simulated seconds.
pub fn calculate_required_substeps(dt: f64) -> u32 {
    if !dt.is_finite() || dt <= MAX_SUBSTEP_SECONDS {
        return 1;
    }
    let substeps = (dt / MAX_SUBSTEP_SECONDS).ceil();
    if substeps >= f64::from(MAX_SUBSTEPS) {
        MAX_SUBSTEPS
    } else {
        substeps as u32
    }
}
