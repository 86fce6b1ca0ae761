use std::collections::HashMap;

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::normalize::normalize;
use crate::source::PacketEvent;
use crate::{PacketSizes, RankedCounts, StatisticsReport, TOP_N};

/// Label counter that remembers first-seen order.
#[derive(Debug, Default)]
pub(crate) struct OrderedCounter {
    index: HashMap<String, usize>,
    entries: Vec<(String, u64)>,
}

impl OrderedCounter {
    pub(crate) fn add(&mut self, label: String) {
        match self.index.get(&label) {
            Some(&slot) => self.entries[slot].1 += 1,
            None => {
                self.index.insert(label.clone(), self.entries.len());
                self.entries.push((label, 1));
            }
        }
    }

    /// The `n` largest counts; equal counts keep first-seen order.
    pub(crate) fn most_common(&self, n: usize) -> RankedCounts {
        let mut ranked = self.entries.clone();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(n);
        RankedCounts::from(ranked)
    }

    pub(crate) fn into_first_seen(self) -> RankedCounts {
        RankedCounts::from(self.entries)
    }
}

/// Running statistics over a sequence of frames.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    packet_count: u64,
    ips: OrderedCounter,
    protocols: OrderedCounter,
    ports: OrderedCounter,
    connections: OrderedCounter,
    sized_frames: u64,
    size_total: u64,
    size_min: Option<u64>,
    size_max: u64,
    first_ts: Option<f64>,
    last_ts: Option<f64>,
}

impl Tally {
    pub(crate) fn observe(&mut self, frame: &PacketEvent) {
        self.packet_count += 1;
        update_ts_bounds(&mut self.first_ts, &mut self.last_ts, frame.ts);

        let record = normalize(frame);
        let (Some(src), Some(dst)) = (record.src_ip, record.dst_ip) else {
            return;
        };
        let proto = record.protocol.as_str();

        self.ips.add(src.to_string());
        self.ips.add(dst.to_string());
        self.protocols.add(proto.to_string());
        if let (Some(src_port), Some(dst_port)) = (record.src_port, record.dst_port) {
            self.ports.add(format!("{proto} {src_port}"));
            self.ports.add(format!("{proto} {dst_port}"));
        }
        self.connections.add(format!("{src} → {dst}"));

        self.sized_frames += 1;
        self.size_total += record.size;
        self.size_min = Some(self.size_min.map_or(record.size, |min| min.min(record.size)));
        self.size_max = self.size_max.max(record.size);
    }

    pub(crate) fn finish(self) -> StatisticsReport {
        let packet_sizes = if self.sized_frames == 0 {
            PacketSizes::default()
        } else {
            PacketSizes {
                min: self.size_min.unwrap_or(0),
                max: self.size_max,
                avg: self.size_total as f64 / self.sized_frames as f64,
            }
        };
        StatisticsReport {
            packet_count: self.packet_count,
            top_ips: self.ips.most_common(TOP_N),
            protocols: self.protocols.into_first_seen(),
            top_ports: self.ports.most_common(TOP_N),
            top_connections: self.connections.most_common(TOP_N),
            packet_sizes,
            time_start: ts_to_rfc3339(self.first_ts),
            time_end: ts_to_rfc3339(self.last_ts),
        }
    }
}

fn update_ts_bounds(first: &mut Option<f64>, last: &mut Option<f64>, ts: Option<f64>) {
    let Some(ts) = ts else {
        return;
    };
    if first.is_none_or(|existing| ts < existing) {
        *first = Some(ts);
    }
    if last.is_none_or(|existing| ts > existing) {
        *last = Some(ts);
    }
}

fn ts_to_rfc3339(ts: Option<f64>) -> Option<String> {
    let ts = ts?;
    // Scale only the fraction; the whole product loses sub-microsecond bits.
    let secs = ts.floor();
    let frac_nanos = ((ts - secs) * 1_000_000_000.0).round() as i128;
    OffsetDateTime::from_unix_timestamp_nanos(secs as i128 * 1_000_000_000 + frac_nanos)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
}
