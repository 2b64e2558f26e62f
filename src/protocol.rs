//! Command/query front-end grammar.
//!
//! Requests start with up to three single-character keys, e.g. `q s` (query
//! state) or `c g r` (command grabber release). Keys are resolved by walking
//! a static lookahead table; payloads (pose, side, numbers) follow as tokens.
//!
//! | Keys    | Request                 | Payload / reply        |
//! |---------|-------------------------|------------------------|
//! | `q s`   | query state             | reply: pose            |
//! | `q i f` | query front image       | reply: frame           |
//! | `q i d` | query down image        | reply: frame           |
//! | `q m m` | query model             | reply: vector          |
//! | `q m s` | query estimator system  | reply: system          |
//! | `q m c` | query model certainty   | reply: `0`             |
//! | `c s`   | set pose command        | pose                   |
//! | `c d`   | drop                    |                        |
//! | `c g g` | grab                    |                        |
//! | `c g r` | release                 |                        |
//! | `c t`   | shoot torpedo           | `l` or `r`             |
//! | `c v`   | enable vision process   | process, `0`/`1`       |
//! | `c p`   | speed limit             | speed                  |
//! | `c l`   | thrust limit            | thrust                 |
//! | `c e`   | estimator variance      | feature, variance      |

use crate::channel::Channel;
use crate::error::{MatsyaError, Result};
use crate::types::{Feature, Pose, Side};

/// Longest key sequence in the grammar.
const MAX_KEYS: usize = 3;

/// Request kind identified by its key sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    QueryState,
    QueryImageFront,
    QueryImageDown,
    QueryModel,
    QuerySystem,
    QueryCertainty,
    SetPose,
    Drop,
    Grab,
    Release,
    Shoot,
    SetVision,
    SetSpeed,
    SetMaxThrust,
    AdjustVariance,
}

enum Node {
    Branch(&'static [(char, Node)]),
    Leaf(Verb),
}

const GRAMMAR: &[(char, Node)] = &[
    (
        'q',
        Node::Branch(&[
            ('s', Node::Leaf(Verb::QueryState)),
            (
                'i',
                Node::Branch(&[
                    ('f', Node::Leaf(Verb::QueryImageFront)),
                    ('d', Node::Leaf(Verb::QueryImageDown)),
                ]),
            ),
            (
                'm',
                Node::Branch(&[
                    ('m', Node::Leaf(Verb::QueryModel)),
                    ('s', Node::Leaf(Verb::QuerySystem)),
                    ('c', Node::Leaf(Verb::QueryCertainty)),
                ]),
            ),
        ]),
    ),
    (
        'c',
        Node::Branch(&[
            ('s', Node::Leaf(Verb::SetPose)),
            ('d', Node::Leaf(Verb::Drop)),
            (
                'g',
                Node::Branch(&[
                    ('g', Node::Leaf(Verb::Grab)),
                    ('r', Node::Leaf(Verb::Release)),
                ]),
            ),
            ('t', Node::Leaf(Verb::Shoot)),
            ('v', Node::Leaf(Verb::SetVision)),
            ('p', Node::Leaf(Verb::SetSpeed)),
            ('l', Node::Leaf(Verb::SetMaxThrust)),
            ('e', Node::Leaf(Verb::AdjustVariance)),
        ]),
    ),
];

impl Verb {
    /// Key sequence for this verb, space separated, found by walking the
    /// grammar.
    pub fn keys(&self) -> String {
        fn walk(table: &[(char, Node)], verb: Verb, path: &mut Vec<char>) -> bool {
            for (key, node) in table {
                path.push(*key);
                let found = match node {
                    Node::Leaf(leaf) => *leaf == verb,
                    Node::Branch(next) => walk(next, verb, path),
                };
                if found {
                    return true;
                }
                path.pop();
            }
            false
        }

        let mut path = Vec::with_capacity(MAX_KEYS);
        walk(GRAMMAR, *self, &mut path);
        path.iter().map(char::to_string).collect::<Vec<_>>().join(" ")
    }

    /// Resolve a verb from a stream of key characters.
    pub fn parse(mut next_key: impl FnMut() -> Result<char>) -> Result<Verb> {
        let mut table = GRAMMAR;
        let mut seen = String::new();

        for _ in 0..MAX_KEYS {
            let key = next_key()?;
            seen.push(key);
            match table.iter().find(|(k, _)| *k == key) {
                Some((_, Node::Leaf(verb))) => return Ok(*verb),
                Some((_, Node::Branch(next))) => table = next,
                None => {
                    return Err(MatsyaError::Protocol(format!(
                        "unknown request keys {:?}",
                        seen
                    )));
                }
            }
        }

        Err(MatsyaError::Protocol(format!("incomplete request keys {:?}", seen)))
    }
}

/// Camera slot addressed by image queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Camera {
    Front,
    Down,
}

impl Camera {
    /// Hub image slot index.
    pub fn index(&self) -> usize {
        match self {
            Camera::Front => 0,
            Camera::Down => 1,
        }
    }
}

/// Fully parsed front-end request.
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    QueryState,
    QueryImage(Camera),
    QueryModel,
    QuerySystem,
    QueryCertainty,
    SetPose(Pose),
    Drop,
    Grab,
    Release,
    Shoot(Side),
    SetVision { process: usize, enabled: bool },
    SetSpeed(f32),
    SetMaxThrust(f32),
    AdjustVariance { feature: Feature, variance: f32 },
}

impl Request {
    pub fn verb(&self) -> Verb {
        match self {
            Request::QueryState => Verb::QueryState,
            Request::QueryImage(Camera::Front) => Verb::QueryImageFront,
            Request::QueryImage(Camera::Down) => Verb::QueryImageDown,
            Request::QueryModel => Verb::QueryModel,
            Request::QuerySystem => Verb::QuerySystem,
            Request::QueryCertainty => Verb::QueryCertainty,
            Request::SetPose(_) => Verb::SetPose,
            Request::Drop => Verb::Drop,
            Request::Grab => Verb::Grab,
            Request::Release => Verb::Release,
            Request::Shoot(_) => Verb::Shoot,
            Request::SetVision { .. } => Verb::SetVision,
            Request::SetSpeed(_) => Verb::SetSpeed,
            Request::SetMaxThrust(_) => Verb::SetMaxThrust,
            Request::AdjustVariance { .. } => Verb::AdjustVariance,
        }
    }

    /// Whether the server answers this request.
    pub fn expects_reply(&self) -> bool {
        self.verb().keys().starts_with('q')
    }

    /// Read one request from a channel.
    pub fn read(channel: &mut Channel) -> Result<Request> {
        let verb = Verb::parse(|| channel.read_char())?;

        let request = match verb {
            Verb::QueryState => Request::QueryState,
            Verb::QueryImageFront => Request::QueryImage(Camera::Front),
            Verb::QueryImageDown => Request::QueryImage(Camera::Down),
            Verb::QueryModel => Request::QueryModel,
            Verb::QuerySystem => Request::QuerySystem,
            Verb::QueryCertainty => Request::QueryCertainty,
            Verb::SetPose => Request::SetPose(Pose::read(channel)?),
            Verb::Drop => Request::Drop,
            Verb::Grab => Request::Grab,
            Verb::Release => Request::Release,
            Verb::Shoot => {
                let c = channel.read_char()?;
                let side = Side::from_char(c).ok_or_else(|| {
                    MatsyaError::Protocol(format!("unknown torpedo side {:?}", c))
                })?;
                Request::Shoot(side)
            }
            Verb::SetVision => {
                let process = channel.read_value()?;
                let enabled = channel.read_value::<u8>()? != 0;
                Request::SetVision { process, enabled }
            }
            Verb::SetSpeed => Request::SetSpeed(channel.read_value()?),
            Verb::SetMaxThrust => Request::SetMaxThrust(channel.read_value()?),
            Verb::AdjustVariance => Request::AdjustVariance {
                feature: Feature(channel.read_value()?),
                variance: channel.read_value()?,
            },
        };

        Ok(request)
    }

    /// Encode as one line of text.
    pub fn to_wire(&self) -> String {
        let keys = self.verb().keys();
        match self {
            Request::SetPose(pose) => format!("{} {}", keys, pose.to_wire()),
            Request::Shoot(side) => format!("{} {}", keys, side.as_char()),
            Request::SetVision { process, enabled } => {
                format!("{} {} {}", keys, process, u8::from(*enabled))
            }
            Request::SetSpeed(v) | Request::SetMaxThrust(v) => format!("{} {}", keys, v),
            Request::AdjustVariance { feature, variance } => {
                format!("{} {} {}", keys, feature.0, variance)
            }
            _ => keys,
        }
    }

    /// Send and flush.
    pub fn write(&self, channel: &mut Channel) -> Result<()> {
        channel.send(&self.to_wire())?;
        channel.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SharedBuffer;
    use std::io::Cursor;

    fn parse_keys(text: &str) -> Result<Verb> {
        let mut chars = text.chars().filter(|c| !c.is_whitespace());
        Verb::parse(|| {
            chars
                .next()
                .ok_or_else(|| MatsyaError::Closed("end of input".into()))
        })
    }

    fn read_request(text: &str) -> Result<Request> {
        let mut ch = Channel::in_memory(
            "frontend",
            Cursor::new(text.as_bytes().to_vec()),
            SharedBuffer::new(),
        );
        Request::read(&mut ch)
    }

    #[test]
    fn test_every_verb_parses_from_its_keys() {
        let verbs = [
            Verb::QueryState,
            Verb::QueryImageFront,
            Verb::QueryImageDown,
            Verb::QueryModel,
            Verb::QuerySystem,
            Verb::QueryCertainty,
            Verb::SetPose,
            Verb::Drop,
            Verb::Grab,
            Verb::Release,
            Verb::Shoot,
            Verb::SetVision,
            Verb::SetSpeed,
            Verb::SetMaxThrust,
            Verb::AdjustVariance,
        ];
        for verb in verbs {
            assert_eq!(parse_keys(&verb.keys()).unwrap(), verb, "keys {:?}", verb.keys());
        }
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(matches!(parse_keys("x"), Err(MatsyaError::Protocol(_))));
        assert!(matches!(parse_keys("q z"), Err(MatsyaError::Protocol(_))));
        assert!(matches!(parse_keys("c g x"), Err(MatsyaError::Protocol(_))));
    }

    #[test]
    fn test_keys_need_no_spaces() {
        assert_eq!(read_request("qif\n").unwrap(), Request::QueryImage(Camera::Front));
    }

    #[test]
    fn test_payloads() {
        assert_eq!(
            read_request("c s 1 2 3 0 0 0\n").unwrap(),
            Request::SetPose(Pose::at(1.0, 2.0, 3.0))
        );
        assert_eq!(read_request("c t r\n").unwrap(), Request::Shoot(Side::Right));
        assert_eq!(
            read_request("c v 2 1\n").unwrap(),
            Request::SetVision {
                process: 2,
                enabled: true
            }
        );
        assert_eq!(
            read_request("c e 7 0.5\n").unwrap(),
            Request::AdjustVariance {
                feature: Feature(7),
                variance: 0.5
            }
        );
        assert!(matches!(read_request("c t x\n"), Err(MatsyaError::Protocol(_))));
    }

    #[test]
    fn test_wire_encoding_reads_back() {
        let requests = [
            Request::SetPose(Pose::new(1.0, -2.0, 0.5, 0.1, 0.0, 0.0)),
            Request::Grab,
            Request::SetSpeed(0.8),
        ];
        for request in requests {
            let line = request.to_wire() + "\n";
            assert_eq!(read_request(&line).unwrap(), request);
        }
    }

    #[test]
    fn test_keys_follow_grammar() {
        assert_eq!(Verb::QueryState.keys(), "q s");
        assert_eq!(Verb::Release.keys(), "c g r");
        assert_eq!(Request::SetVision { process: 1, enabled: true }.to_wire(), "c v 1 1");
    }

    #[test]
    fn test_only_queries_expect_reply() {
        assert!(Request::QueryModel.expects_reply());
        assert!(!Request::Drop.expects_reply());
    }
}
