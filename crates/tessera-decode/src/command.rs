//! Geometry command stream decoding.

use glam::DVec2;

use crate::error::{DecodeError, DecodeResult};

const MOVE_TO: u32 = 1;
const LINE_TO: u32 = 2;
const CLOSE_PATH: u32 = 7;

/// A run of vertices started by a `MoveTo` command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    /// Vertices in tile-local coordinates.
    pub points: Vec<DVec2>,
    /// Whether a `ClosePath` command ended this path.
    pub closed: bool,
}

/// Decode a zigzag-encoded parameter integer.
///
/// Maps `0, 1, 2, 3, ...` to `0, -1, 1, -2, ...`.
#[must_use]
pub fn decode_zigzag(value: u32) -> i32 {
    #[allow(clippy::cast_possible_wrap)]
    let shifted = (value >> 1) as i32;
    #[allow(clippy::cast_possible_wrap)]
    let sign = -((value & 1) as i32);
    shifted ^ sign
}

/// Decode a feature's command stream into paths.
///
/// Each command integer packs `(count << 3) | id`. `MoveTo` and `LineTo`
/// are followed by `count` zigzag-encoded `(dx, dy)` pairs, relative to a
/// cursor that carries over from one command to the next. `MoveTo` always
/// starts a new path, so a multi-point feature decodes to one single-point
/// path per point.
///
/// # Errors
///
/// Returns an error if the stream ends inside a command, uses an unknown
/// command id, or draws a line before any `MoveTo`.
pub fn decode_commands(geometry: &[u32]) -> DecodeResult<Vec<Path>> {
    let mut paths: Vec<Path> = Vec::new();
    let mut cursor = (0i64, 0i64);
    let mut offset = 0;

    while offset < geometry.len() {
        let command = geometry[offset];
        offset += 1;

        let id = command & 0x7;
        let count = (command >> 3) as usize;

        match id {
            MOVE_TO | LINE_TO => {
                if id == LINE_TO && paths.is_empty() {
                    return Err(DecodeError::InvalidFormat {
                        context: "geometry",
                        detail: "LineTo before MoveTo".to_string(),
                    });
                }
                if offset + count * 2 > geometry.len() {
                    return Err(DecodeError::UnexpectedEof {
                        context: "geometry",
                    });
                }

                for _ in 0..count {
                    cursor.0 += i64::from(decode_zigzag(geometry[offset]));
                    cursor.1 += i64::from(decode_zigzag(geometry[offset + 1]));
                    offset += 2;

                    #[allow(clippy::cast_precision_loss)]
                    let point = DVec2::new(cursor.0 as f64, cursor.1 as f64);
                    if id == MOVE_TO {
                        paths.push(Path {
                            points: vec![point],
                            closed: false,
                        });
                    } else if let Some(path) = paths.last_mut() {
                        path.points.push(point);
                    }
                }
            }
            CLOSE_PATH => {
                let Some(path) = paths.last_mut() else {
                    return Err(DecodeError::InvalidFormat {
                        context: "geometry",
                        detail: "ClosePath before MoveTo".to_string(),
                    });
                };
                path.closed = true;
            }
            other => {
                return Err(DecodeError::InvalidFormat {
                    context: "geometry",
                    detail: format!("unknown command id {other}"),
                });
            }
        }
    }

    Ok(paths)
}

/// Encode a command integer. Used by tests and tile writers.
#[must_use]
pub fn command_integer(id: u32, count: u32) -> u32 {
    (count << 3) | (id & 0x7)
}

/// Zigzag-encode a parameter integer.
#[must_use]
pub fn encode_zigzag(value: i32) -> u32 {
    #[allow(clippy::cast_sign_loss)]
    let encoded = ((value << 1) ^ (value >> 31)) as u32;
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zigzag() {
        assert_eq!(decode_zigzag(0), 0);
        assert_eq!(decode_zigzag(1), -1);
        assert_eq!(decode_zigzag(2), 1);
        assert_eq!(decode_zigzag(3), -2);
        assert_eq!(decode_zigzag(50), 25);

        for v in [-4096, -1, 0, 1, 7, 4096, i32::MAX, i32::MIN] {
            assert_eq!(decode_zigzag(encode_zigzag(v)), v);
        }
    }

    #[test]
    fn test_decode_point() {
        // MoveTo(25, 17) from the vector tile specification examples.
        let geometry = [9, 50, 34];
        let paths = decode_commands(&geometry).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].points, vec![DVec2::new(25.0, 17.0)]);
        assert!(!paths[0].closed);
    }

    #[test]
    fn test_decode_multi_point() {
        // MoveTo(5, 7), MoveTo(3, 2).
        let geometry = [17, 10, 14, 3, 9];
        let paths = decode_commands(&geometry).unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].points, vec![DVec2::new(5.0, 7.0)]);
        assert_eq!(paths[1].points, vec![DVec2::new(3.0, 2.0)]);
    }

    #[test]
    fn test_decode_linestring() {
        // MoveTo(2, 2), LineTo(2, 10), LineTo(10, 10).
        let geometry = [9, 4, 4, 18, 0, 16, 16, 0];
        let paths = decode_commands(&geometry).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(
            paths[0].points,
            vec![
                DVec2::new(2.0, 2.0),
                DVec2::new(2.0, 10.0),
                DVec2::new(10.0, 10.0)
            ]
        );
    }

    #[test]
    fn test_decode_polygon_ring() {
        // MoveTo(3, 6), LineTo(8, 12), LineTo(20, 34), ClosePath.
        let geometry = [9, 6, 12, 18, 10, 12, 24, 44, 15];
        let paths = decode_commands(&geometry).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].closed);
        assert_eq!(paths[0].points.len(), 3);
        assert_eq!(paths[0].points[2], DVec2::new(20.0, 34.0));
    }

    #[test]
    fn test_cursor_carries_between_paths() {
        // Two line strings; the second MoveTo is relative to the end of the first.
        let geometry = [
            command_integer(MOVE_TO, 1),
            encode_zigzag(10),
            encode_zigzag(10),
            command_integer(LINE_TO, 1),
            encode_zigzag(5),
            encode_zigzag(0),
            command_integer(MOVE_TO, 1),
            encode_zigzag(-15),
            encode_zigzag(-10),
            command_integer(LINE_TO, 1),
            encode_zigzag(1),
            encode_zigzag(1),
        ];
        let paths = decode_commands(&geometry).unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[1].points[0], DVec2::ZERO);
        assert_eq!(paths[1].points[1], DVec2::new(1.0, 1.0));
    }

    #[test]
    fn test_truncated_stream() {
        let geometry = [9, 50];
        assert!(matches!(
            decode_commands(&geometry),
            Err(DecodeError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_line_to_without_move_to() {
        let geometry = [10, 2, 2];
        assert!(matches!(
            decode_commands(&geometry),
            Err(DecodeError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_unknown_command() {
        let geometry = [command_integer(3, 1), 0, 0];
        assert!(matches!(
            decode_commands(&geometry),
            Err(DecodeError::InvalidFormat { .. })
        ));
    }

    proptest::proptest! {
        #[test]
        fn test_arbitrary_streams_never_panic(geometry in proptest::collection::vec(proptest::num::u32::ANY, 0..64)) {
            let _ = decode_commands(&geometry);
        }
    }
}
