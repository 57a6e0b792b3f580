// Round scoring from resting puck positions
//
// Pucks are walked from the far edge inwards. The first puck inside a zone
// decides the round's color; further pucks of that color add their zone
// points until a puck of the other color inside a zone blocks the rest.

use std::cmp::Ordering;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::bounds::Aabb;
use super::puck::PuckColor;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringZone {
    pub bounds: Aabb,
    pub points: u32,
}

/// What the scoring engine needs to know about a puck
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredPuck {
    pub color: PuckColor,
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundScore {
    pub winner: Option<PuckColor>,
    pub points: u32,
}

impl RoundScore {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Points of the first zone (innermost first) containing `position`
pub fn zone_points(zones: &[ScoringZone], position: Vec3) -> Option<u32> {
    zones
        .iter()
        .find(|zone| zone.bounds.contains(position))
        .map(|zone| zone.points)
}

pub fn calculate_round_score(pucks: &[ScoredPuck], zones: &[ScoringZone], axis: Vec3) -> RoundScore {
    let mut ordered: Vec<&ScoredPuck> = pucks.iter().collect();
    ordered.sort_by(|a, b| {
        b.position
            .dot(axis)
            .partial_cmp(&a.position.dot(axis))
            .unwrap_or(Ordering::Equal)
    });

    let mut score = RoundScore::none();
    for puck in ordered {
        let Some(points) = zone_points(zones, puck.position) else {
            continue;
        };

        match score.winner {
            None => {
                score.winner = Some(puck.color);
                score.points = points;
            }
            Some(color) if color == puck.color => score.points += points,
            Some(_) => break,
        }
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    // Three bands along +X, innermost (far) first
    fn zones() -> Vec<ScoringZone> {
        let band = |near: f32, far: f32, points: u32| ScoringZone {
            bounds: Aabb::new(Vec3::new(near, -10.0, -1.0), Vec3::new(far, 10.0, 1.0)),
            points,
        };
        vec![band(20.0, 30.0, 3), band(10.0, 20.0, 2), band(0.0, 10.0, 1)]
    }

    fn puck(color: PuckColor, x: f32) -> ScoredPuck {
        ScoredPuck {
            color,
            position: Vec3::new(x, 0.0, 0.0),
        }
    }

    #[test]
    fn test_opposite_color_blocks_further_credit() {
        let pucks = [
            puck(PuckColor::Red, 28.0),
            puck(PuckColor::Blue, 24.0),
            puck(PuckColor::Red, 5.0),
        ];
        let score = calculate_round_score(&pucks, &zones(), Vec3::X);

        assert_eq!(score.winner, Some(PuckColor::Red));
        assert_eq!(score.points, 3);
    }

    #[test]
    fn test_same_color_accumulates() {
        let pucks = [puck(PuckColor::Red, 5.0), puck(PuckColor::Red, 28.0)];
        let score = calculate_round_score(&pucks, &zones(), Vec3::X);

        assert_eq!(score.winner, Some(PuckColor::Red));
        assert_eq!(score.points, 4);
    }

    #[test]
    fn test_pucks_outside_zones_do_not_interrupt() {
        let pucks = [
            puck(PuckColor::Blue, 35.0), // past the far edge, no zone
            puck(PuckColor::Blue, 22.0),
            puck(PuckColor::Red, -5.0), // short of every zone
            puck(PuckColor::Blue, 12.0),
        ];
        let score = calculate_round_score(&pucks, &zones(), Vec3::X);

        assert_eq!(score.winner, Some(PuckColor::Blue));
        assert_eq!(score.points, 5);
    }

    #[test]
    fn test_no_scoring_puck_means_no_winner() {
        let pucks = [puck(PuckColor::Red, -3.0), puck(PuckColor::Blue, 40.0)];
        assert_eq!(calculate_round_score(&pucks, &zones(), Vec3::X), RoundScore::none());
        assert_eq!(calculate_round_score(&[], &zones(), Vec3::X), RoundScore::none());
    }

    #[test]
    fn test_overlapping_zones_award_innermost_only() {
        let mut overlapping = zones();
        overlapping.push(ScoringZone {
            bounds: Aabb::new(Vec3::new(0.0, -10.0, -1.0), Vec3::new(30.0, 10.0, 1.0)),
            points: 10,
        });
        assert_eq!(zone_points(&overlapping, Vec3::new(25.0, 0.0, 0.0)), Some(3));
    }

    #[test]
    fn test_axis_decides_order() {
        // Along -X the near puck is the "furthest"
        let pucks = [puck(PuckColor::Red, 25.0), puck(PuckColor::Blue, 5.0)];
        let score = calculate_round_score(&pucks, &zones(), Vec3::NEG_X);

        assert_eq!(score.winner, Some(PuckColor::Blue));
        assert_eq!(score.points, 1);
    }
}
