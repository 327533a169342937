//! Opaque predicate synthesis
//!
//! Conditions whose truth value is fixed by construction but not obvious
//! statically. Kinds are gated by level: math congruences everywhere,
//! array aliasing from medium up, LCG state history and timing checks at
//! high. Predicates back ghost branches, honeypots and junk injection.

use crate::options::{OpaqueLevel, Options};
use crate::rng::Prng;

pub struct OpaquePool {
    pub enabled: bool,
    pub prob: f64,
    level: OpaqueLevel,
    array_name: String,
    array_values: Vec<i64>,
    history_name: String,
    epoch_name: String,
}

impl OpaquePool {
    pub fn new(options: &Options, prng: &mut Prng) -> Self {
        let array_values = (0..8).map(|_| prng.range(10, 10_000)).collect();
        Self {
            enabled: options.opaque_predicates,
            prob: options.opaque_prob,
            level: options.opaque_level,
            array_name: prng.identifier(),
            array_values,
            history_name: prng.identifier(),
            epoch_name: prng.identifier(),
        }
    }

    /// Top-level declarations the predicates rely on
    pub fn declarations(&self, prng: &mut Prng) -> Vec<String> {
        if !self.enabled {
            return Vec::new();
        }
        let mut decls = Vec::new();
        if self.level >= OpaqueLevel::Medium {
            let values: Vec<String> = self.array_values.iter().map(|v| v.to_string()).collect();
            decls.push(format!(
                "const {} = [{}];",
                self.array_name,
                values.join(", ")
            ));
        }
        if self.level >= OpaqueLevel::High {
            decls.push(format!(
                "let {} = {};",
                self.history_name,
                prng.range(1, 0x7fff_ffff)
            ));
            decls.push(format!("const {} = Date.now();", self.epoch_name));
        }
        decls
    }

    /// Statement advancing the LCG history once per dispatch iteration
    pub fn step_statement(&self) -> Option<String> {
        (self.enabled && self.level >= OpaqueLevel::High).then(|| {
            format!(
                "{h} = (Math.imul({h}, 1103515245) + 12345) & 2147483647;",
                h = self.history_name
            )
        })
    }

    /// A condition that always holds
    pub fn truthy(&self, prng: &mut Prng) -> String {
        match self.pick_kind(prng) {
            Kind::Congruence => {
                let x = prng.range(3, 5000);
                if prng.chance(0.5) {
                    // squares are 0 or 1 mod 4
                    format!("({x} * {x}) % 4 !== 2")
                } else {
                    // consecutive product is even
                    format!("({x} * {}) % 2 === 0", x + 1)
                }
            }
            Kind::ArrayAlias => {
                let i = prng.index(self.array_values.len());
                format!("{}[{}] === {}", self.array_name, i, self.array_values[i])
            }
            Kind::History => format!(
                "({h} & 1) === {h} % 2",
                h = self.history_name
            ),
            Kind::Timing => format!("Date.now() - {} > -1", self.epoch_name),
        }
    }

    /// A condition that never holds
    pub fn falsy(&self, prng: &mut Prng) -> String {
        match self.pick_kind(prng) {
            Kind::Congruence => {
                let x = prng.range(3, 5000);
                format!("({x} * {x}) % 4 === 2")
            }
            Kind::ArrayAlias => {
                let i = prng.index(self.array_values.len());
                format!("{}[{}] === {}", self.array_name, i, self.array_values[i] + 1)
            }
            Kind::History => format!(
                "({h} & 1) !== {h} % 2",
                h = self.history_name
            ),
            Kind::Timing => format!("Date.now() - {} < 0", self.epoch_name),
        }
    }

    /// Coin for one injection point
    pub fn roll(&self, prng: &mut Prng) -> bool {
        self.enabled && prng.chance(self.prob)
    }

    fn pick_kind(&self, prng: &mut Prng) -> Kind {
        let mut kinds = vec![Kind::Congruence];
        if self.level >= OpaqueLevel::Medium {
            kinds.push(Kind::ArrayAlias);
        }
        if self.level >= OpaqueLevel::High {
            kinds.push(Kind::History);
            kinds.push(Kind::Timing);
        }
        *prng.pick(&kinds)
    }
}

#[derive(Clone, Copy)]
enum Kind {
    Congruence,
    ArrayAlias,
    History,
    Timing,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(level: OpaqueLevel) -> (OpaquePool, Prng) {
        let options = Options {
            opaque_predicates: true,
            opaque_level: level,
            opaque_prob: 1.0,
            ..Options::default()
        };
        let mut prng = Prng::new(Some(11));
        let pool = OpaquePool::new(&options, &mut prng);
        (pool, prng)
    }

    #[test]
    fn test_low_level_has_no_declarations() {
        let (pool, mut prng) = pool(OpaqueLevel::Low);
        assert!(pool.declarations(&mut prng).is_empty());
        assert!(pool.step_statement().is_none());
    }

    #[test]
    fn test_high_level_declares_history_and_epoch() {
        let (pool, mut prng) = pool(OpaqueLevel::High);
        assert_eq!(pool.declarations(&mut prng).len(), 3);
        assert!(pool.step_statement().is_some());
    }

    #[test]
    fn test_congruence_predicates_hold() {
        // The emitted arithmetic must actually be constant-true/false.
        for x in 3i64..200 {
            assert_ne!((x * x) % 4, 2);
            assert_eq!((x * (x + 1)) % 2, 0);
        }
    }

    #[test]
    fn test_disabled_pool_never_rolls() {
        let options = Options::default();
        let mut prng = Prng::new(Some(3));
        let pool = OpaquePool::new(&options, &mut prng);
        assert!(!pool.roll(&mut prng));
    }
}
