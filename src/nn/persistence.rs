//! Flat text dumps of network parameters
//!
//! One value per line. For each layer in order: stride, padding, then for
//! each kernel its weights in (row, column, channel) order followed by its
//! bias. Shapes are not stored, so a dump can only be loaded into a network
//! already built with the same layout. Floats are written with Rust's
//! shortest round-trip formatting, so a reload reproduces every parameter
//! bit for bit.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use super::error::NetworkError;
use super::network::Network;

/// Number of lines a dump of `network` contains
pub fn weight_count(network: &Network) -> usize {
    network
        .layers()
        .iter()
        .map(|layer| 2 + layer.parameter_count())
        .sum()
}

/// Write every parameter of `network` to `writer`
pub fn write_weights<W: Write>(network: &Network, mut writer: W) -> Result<(), NetworkError> {
    for layer in network.layers() {
        writeln!(writer, "{}", layer.stride())?;
        writeln!(writer, "{}", layer.padding())?;
        for kernel in layer.kernels() {
            for value in kernel.weights.iter() {
                writeln!(writer, "{value}")?;
            }
            writeln!(writer, "{}", kernel.bias)?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Overwrite the parameters of `network` from a dump
///
/// The whole dump is parsed and checked against the network's layout before
/// any parameter changes. A stride or padding that differs from the
/// network's is reported as [`NetworkError::WeightLayout`]. Optimizer state
/// is left untouched.
pub fn read_weights<R: BufRead>(network: &mut Network, reader: R) -> Result<(), NetworkError> {
    let mut lines = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let text = line.trim();
        if !text.is_empty() {
            lines.push((index + 1, text.to_string()));
        }
    }

    let expected = weight_count(network);
    if lines.len() != expected {
        return Err(NetworkError::WeightCount {
            expected,
            found: lines.len(),
        });
    }

    let mut values = Vec::with_capacity(expected);
    let mut cursor = lines.iter();
    for (index, layer) in network.layers().iter().enumerate() {
        for (name, configured) in [("stride", layer.stride()), ("padding", layer.padding())] {
            let (line, stored) = next_integer(&mut cursor)?;
            if stored != configured {
                return Err(NetworkError::WeightLayout {
                    line,
                    reason: format!("layer {index} {name} is {stored}, network uses {configured}"),
                });
            }
        }
        for _ in 0..layer.parameter_count() {
            values.push(next_float(&mut cursor)?);
        }
    }

    let mut values = values.into_iter();
    for layer in network.layers_mut() {
        for kernel in &mut layer.kernels {
            for (w, v) in kernel.weights.iter_mut().zip(values.by_ref()) {
                *w = v;
            }
            if let Some(bias) = values.next() {
                kernel.bias = bias;
            }
        }
    }
    Ok(())
}

fn next_line<'a, I>(cursor: &mut I) -> Result<&'a (usize, String), NetworkError>
where
    I: Iterator<Item = &'a (usize, String)>,
{
    // Line count was checked up front
    cursor.next().ok_or(NetworkError::WeightCount {
        expected: 0,
        found: 0,
    })
}

fn next_integer<'a, I>(cursor: &mut I) -> Result<(usize, usize), NetworkError>
where
    I: Iterator<Item = &'a (usize, String)>,
{
    let (line, text) = next_line(cursor)?;
    text.parse::<usize>()
        .map(|v| (*line, v))
        .map_err(|_| NetworkError::WeightParse {
            line: *line,
            text: text.clone(),
        })
}

fn next_float<'a, I>(cursor: &mut I) -> Result<f64, NetworkError>
where
    I: Iterator<Item = &'a (usize, String)>,
{
    let (line, text) = next_line(cursor)?;
    text.parse::<f64>().map_err(|_| NetworkError::WeightParse {
        line: *line,
        text: text.clone(),
    })
}

/// Write a dump to `path`, creating parent directories as needed
pub fn save_weights(network: &Network, path: &Path) -> Result<(), NetworkError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    write_weights(network, BufWriter::new(file))
}

/// Load a dump from `path` into `network`
pub fn load_weights(network: &mut Network, path: &Path) -> Result<(), NetworkError> {
    let file = File::open(path)?;
    read_weights(network, BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Tensor, Topology};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::io::Cursor;

    fn small_network(seed: u64) -> Network {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut network = Network::new();
        network.add_layer(3, 2, 2, 1, 2, 1, &mut rng).unwrap();
        network.add_layer(2, 2, 2, 3, 1, 0, &mut rng).unwrap();
        network
    }

    fn dump(network: &Network) -> String {
        let mut buffer = Vec::new();
        write_weights(network, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_dump_layout() {
        let network = small_network(1);
        let text = dump(&network);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), weight_count(&network));
        assert_eq!(lines.len(), 2 + 3 * 5 + 2 + 2 * 13);
        assert_eq!(lines[0], "2");
        assert_eq!(lines[1], "1");
        assert_eq!(lines[2].parse::<f64>().unwrap(), network.layers()[0].kernels()[0].weights[(0, 0, 0)]);
        assert_eq!(lines[6], "0");
    }

    #[test]
    fn test_round_trip_reproduces_forward_output() {
        let mut rng = StdRng::seed_from_u64(11);
        let topology = Topology::strided(1);
        let trained = topology.build(&mut rng).unwrap();
        let mut fresh = topology.build(&mut rng).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("weights.txt");
        save_weights(&trained, &path).unwrap();
        load_weights(&mut fresh, &path).unwrap();

        for (a, b) in trained.layers().iter().zip(fresh.layers()) {
            for (ka, kb) in a.kernels().iter().zip(b.kernels()) {
                assert_eq!(ka.weights, kb.weights);
                assert_eq!(ka.bias.to_bits(), kb.bias.to_bits());
            }
        }

        let input = Tensor::from_fn(10, 10, 1, |_, _, _| rng.gen_range(0.0..1.0));
        assert_eq!(trained.predict(&input).unwrap(), fresh.predict(&input).unwrap());
    }

    #[test]
    fn test_count_mismatch_leaves_network_untouched() {
        let source = small_network(2);
        let mut target = small_network(3);
        let snapshot = target.clone();

        let mut text = dump(&source);
        text.push_str("0.5\n");
        assert!(matches!(
            read_weights(&mut target, Cursor::new(text)),
            Err(NetworkError::WeightCount { .. })
        ));

        let short: String = dump(&source).lines().skip(1).map(|l| format!("{l}\n")).collect();
        assert!(read_weights(&mut target, Cursor::new(short)).is_err());
        assert_eq!(target, snapshot);
    }

    #[test]
    fn test_unparsable_value_reports_line() {
        let source = small_network(4);
        let mut target = small_network(4);
        let mut lines: Vec<String> = dump(&source).lines().map(str::to_string).collect();
        lines[5] = "abc".to_string();
        let text = lines.join("\n");

        match read_weights(&mut target, Cursor::new(text)) {
            Err(NetworkError::WeightParse { line, text }) => {
                assert_eq!(line, 6);
                assert_eq!(text, "abc");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_stride_mismatch_is_layout_error() {
        let source = small_network(5);
        let mut rng = StdRng::seed_from_u64(5);
        let mut target = Network::new();
        target.add_layer(3, 2, 2, 1, 1, 1, &mut rng).unwrap();
        target.add_layer(2, 2, 2, 3, 1, 0, &mut rng).unwrap();

        assert!(matches!(
            read_weights(&mut target, Cursor::new(dump(&source))),
            Err(NetworkError::WeightLayout { line: 1, .. })
        ));
    }
}
