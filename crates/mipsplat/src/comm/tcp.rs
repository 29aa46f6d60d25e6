//! Multi-process group over TCP.
//!
//! Star topology rooted at rank 0: every other rank holds one connection to
//! the root. The root folds contributions in rank order and sends results
//! back where the collective requires it.
//!
//! Wire format (little-endian):
//!
//!   hello (leaf → root, once):
//!     [u8;4] magic = b"MIPG"  u32 rank  u32 size
//!
//!   contribution (leaf → root, per collective):
//!     u8 kind (0 = all-reduce, 1 = reduce)  u8 op  u32 root  u32 count
//!     [f64; count]
//!
//!   result (root → leaf, when the leaf receives one):
//!     u32 count  [f64; count]

use super::{ProcessGroup, ReduceOp};
use crate::error::CommError;
use parking_lot::Mutex;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

pub const HELLO_MAGIC: [u8; 4] = *b"MIPG";

const KIND_ALL_REDUCE: u8 = 0;
const KIND_REDUCE: u8 = 1;

/// Upper bound on a single collective payload (values), to reject garbage
/// headers before allocating.
const MAX_VALUES: usize = 1 << 28;

/// One rank of a TCP-connected process group.
pub struct TcpGroup {
    rank: usize,
    size: usize,
    link: Link,
}

enum Link {
    /// Rank 0: one stream per peer, indexed by `rank - 1`.
    Root(Vec<Mutex<TcpStream>>),
    Leaf(Mutex<TcpStream>),
}

/// A bound root socket that has not yet accepted its peers.
pub struct RootListener {
    listener: TcpListener,
}

impl RootListener {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr)?,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Blocks until all `size - 1` peers have connected and introduced
    /// themselves.
    pub fn accept(self, size: usize) -> Result<TcpGroup, CommError> {
        let size = size.max(1);
        let mut slots: Vec<Option<TcpStream>> = (1..size).map(|_| None).collect();
        let mut pending = size - 1;

        while pending > 0 {
            let (mut stream, peer) = self.listener.accept()?;
            stream.set_nodelay(true)?;

            let mut magic = [0u8; 4];
            stream.read_exact(&mut magic)?;
            if magic != HELLO_MAGIC {
                log::warn!("rejecting connection from {}: bad magic", peer);
                continue;
            }
            let rank = read_u32(&mut stream)? as usize;
            let their_size = read_u32(&mut stream)? as usize;

            if their_size != size {
                return Err(CommError::Protocol {
                    rank,
                    detail: format!("peer expects group size {}, root has {}", their_size, size),
                });
            }
            if rank == 0 || rank >= size {
                return Err(CommError::InvalidRank { rank, size });
            }
            if slots[rank - 1].is_some() {
                return Err(CommError::Protocol {
                    rank,
                    detail: "rank connected twice".into(),
                });
            }

            log::debug!("rank {} joined from {}", rank, peer);
            slots[rank - 1] = Some(stream);
            pending -= 1;
        }

        let peers = slots
            .into_iter()
            .flatten()
            .map(Mutex::new)
            .collect();

        Ok(TcpGroup {
            rank: 0,
            size,
            link: Link::Root(peers),
        })
    }
}

impl TcpGroup {
    /// Joins a group: rank 0 listens on `addr`, other ranks connect to it.
    pub fn join(
        addr: &str,
        rank: usize,
        size: usize,
        timeout: Duration,
    ) -> Result<Self, CommError> {
        if rank >= size {
            return Err(CommError::InvalidRank { rank, size });
        }
        if rank == 0 {
            RootListener::bind(addr)?.accept(size)
        } else {
            Self::connect(addr, rank, size, timeout)
        }
    }

    /// Connects a non-root rank, retrying until the root is listening or
    /// `timeout` elapses.
    pub fn connect<A: ToSocketAddrs + ToString>(
        addr: A,
        rank: usize,
        size: usize,
        timeout: Duration,
    ) -> Result<Self, CommError> {
        if rank == 0 || rank >= size {
            return Err(CommError::InvalidRank { rank, size });
        }

        let deadline = Instant::now() + timeout;
        let mut stream = loop {
            match TcpStream::connect(&addr) {
                Ok(s) => break s,
                Err(e) if Instant::now() < deadline => {
                    log::trace!("root not reachable yet: {}", e);
                    thread::sleep(Duration::from_millis(50));
                }
                Err(_) => {
                    return Err(CommError::ConnectTimeout {
                        addr: addr.to_string(),
                    })
                }
            }
        };
        stream.set_nodelay(true)?;

        stream.write_all(&HELLO_MAGIC)?;
        write_u32(&mut stream, rank as u32)?;
        write_u32(&mut stream, size as u32)?;
        stream.flush()?;

        Ok(Self {
            rank,
            size,
            link: Link::Leaf(Mutex::new(stream)),
        })
    }

    fn collective(
        &self,
        kind: u8,
        values: &[f64],
        op: ReduceOp,
        root: usize,
    ) -> Result<Option<Vec<f64>>, CommError> {
        if root >= self.size {
            return Err(CommError::InvalidRank {
                rank: root,
                size: self.size,
            });
        }
        let receives = kind == KIND_ALL_REDUCE || self.rank == root;

        match &self.link {
            Link::Root(peers) => {
                let mut acc = values.to_vec();
                for (i, peer) in peers.iter().enumerate() {
                    let mut stream = peer.lock();
                    let contribution = read_contribution(&mut *stream, i + 1)?;
                    contribution.check(i + 1, kind, op, root, acc.len())?;
                    op.fold_into(&mut acc, &contribution.values);
                }

                if kind == KIND_ALL_REDUCE {
                    for peer in peers {
                        write_values(&mut *peer.lock(), &acc)?;
                    }
                } else if root != 0 {
                    write_values(&mut *peers[root - 1].lock(), &acc)?;
                }

                Ok(receives.then_some(acc))
            }
            Link::Leaf(stream) => {
                let mut stream = stream.lock();
                write_contribution(&mut *stream, kind, op, root, values)?;
                if receives {
                    let out = read_values(&mut *stream)?;
                    if out.len() != values.len() {
                        return Err(CommError::LengthMismatch {
                            rank: 0,
                            expected: values.len(),
                            got: out.len(),
                        });
                    }
                    Ok(Some(out))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

impl ProcessGroup for TcpGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_reduce(&self, values: &[f64], op: ReduceOp) -> Result<Vec<f64>, CommError> {
        let out = self.collective(KIND_ALL_REDUCE, values, op, 0)?;
        // All-reduce always delivers; an empty answer would be a root bug.
        out.ok_or_else(|| CommError::Protocol {
            rank: 0,
            detail: "all-reduce produced no result".into(),
        })
    }

    fn reduce(
        &self,
        values: &[f64],
        op: ReduceOp,
        root: usize,
    ) -> Result<Option<Vec<f64>>, CommError> {
        self.collective(KIND_REDUCE, values, op, root)
    }
}

struct Contribution {
    kind: u8,
    op: u8,
    root: usize,
    values: Vec<f64>,
}

impl Contribution {
    fn check(
        &self,
        rank: usize,
        kind: u8,
        op: ReduceOp,
        root: usize,
        len: usize,
    ) -> Result<(), CommError> {
        if self.kind != kind || ReduceOp::from_u8(self.op) != Some(op) || self.root != root {
            return Err(CommError::Protocol {
                rank,
                detail: format!(
                    "expected kind={} op={:?} root={}, got kind={} op={} root={}",
                    kind, op, root, self.kind, self.op, self.root
                ),
            });
        }
        if self.values.len() != len {
            return Err(CommError::LengthMismatch {
                rank,
                expected: len,
                got: self.values.len(),
            });
        }
        Ok(())
    }
}

fn read_contribution<R: Read>(r: &mut R, rank: usize) -> Result<Contribution, CommError> {
    let mut head = [0u8; 2];
    r.read_exact(&mut head)?;
    let root = read_u32(r)? as usize;
    let values = read_values(r).map_err(|e| match e {
        CommError::Io(io) if io.kind() == ErrorKind::InvalidData => CommError::Protocol {
            rank,
            detail: io.to_string(),
        },
        other => other,
    })?;
    Ok(Contribution {
        kind: head[0],
        op: head[1],
        root,
        values,
    })
}

fn write_contribution<W: Write>(
    w: &mut W,
    kind: u8,
    op: ReduceOp,
    root: usize,
    values: &[f64],
) -> io::Result<()> {
    w.write_all(&[kind, op as u8])?;
    write_u32(w, root as u32)?;
    write_values(w, values)
}

fn read_values<R: Read>(r: &mut R) -> Result<Vec<f64>, CommError> {
    let count = read_u32(r)? as usize;
    if count > MAX_VALUES {
        return Err(io::Error::new(ErrorKind::InvalidData, "collective payload too large").into());
    }
    let mut raw = vec![0u8; count * 8];
    r.read_exact(&mut raw)?;
    Ok(raw
        .chunks_exact(8)
        .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .collect())
}

fn write_values<W: Write>(w: &mut W, values: &[f64]) -> io::Result<()> {
    let mut buf = Vec::with_capacity(4 + values.len() * 8);
    buf.extend_from_slice(&(values.len() as u32).to_le_bytes());
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    w.write_all(&buf)?;
    w.flush()
}

#[inline]
fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

#[inline]
fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn contribution_frame_layout() {
        let mut buf = Vec::new();
        write_contribution(&mut buf, KIND_REDUCE, ReduceOp::Max, 0, &[1.5, -2.0]).unwrap();
        assert_eq!(&buf[..2], &[KIND_REDUCE, ReduceOp::Max as u8]);
        assert_eq!(&buf[2..6], &0u32.to_le_bytes());
        assert_eq!(&buf[6..10], &2u32.to_le_bytes());
        assert_eq!(buf.len(), 10 + 16);

        let c = read_contribution(&mut Cursor::new(buf), 1).unwrap();
        assert_eq!(c.values, vec![1.5, -2.0]);
        assert!(c.check(1, KIND_REDUCE, ReduceOp::Max, 0, 2).is_ok());
        assert!(c.check(1, KIND_ALL_REDUCE, ReduceOp::Max, 0, 2).is_err());
        assert!(c.check(1, KIND_REDUCE, ReduceOp::Max, 0, 3).is_err());
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let mut buf = Vec::new();
        write_u32(&mut buf, u32::MAX).unwrap();
        assert!(read_values(&mut Cursor::new(buf)).is_err());
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let mut buf = Vec::new();
        write_values(&mut buf, &[1.0, 2.0]).unwrap();
        buf.truncate(buf.len() - 3);
        assert!(read_values(&mut Cursor::new(buf)).is_err());
    }
}
