//! Conversion of runtime traces into Perfetto protobuf traces.
//!
//! The JSON runtime trace is the inspector's native format; this module
//! renders the same events as a Perfetto trace so a run can be opened in
//! the Perfetto UI. Each run block becomes a process track, each chain a
//! thread track, and each profile event a slice on its chain track.

use std::mem;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use perfetto_protos::process_descriptor::ProcessDescriptor;
use perfetto_protos::thread_descriptor::ThreadDescriptor;
use perfetto_protos::trace::Trace;
use perfetto_protos::trace_packet::TracePacket;
use perfetto_protos::track_descriptor::TrackDescriptor;
use perfetto_protos::track_event::track_event::Type;
use perfetto_protos::track_event::TrackEvent;
use protobuf::Message;
use workerpool::thunk::{Thunk, ThunkWorker};
use workerpool::Pool;

use crate::tracer::{RunBlock, RunTrace};

/// Convert a runtime trace into a Perfetto trace.
pub fn generate_trace(trace: &RunTrace) -> Trace {
    let id_counter = Arc::new(AtomicUsize::new(1));
    let mut packets = Vec::new();

    let root_uuid = id_counter.fetch_add(1, Ordering::Relaxed) as u64;
    let mut desc = TrackDescriptor::default();
    desc.set_uuid(root_uuid);
    desc.set_name(format!("opsight: {}", trace.program_name));
    let mut packet = TracePacket::default();
    packet.set_track_descriptor(desc);
    packets.push(packet);

    // Run blocks are independent, so fan the packet generation out.
    let block_packets = Arc::new(Mutex::new(Vec::new()));
    let pool = Pool::<ThunkWorker<()>>::new(4);
    for block in trace.runs.iter() {
        let block = block.clone();
        let program_name = trace.program_name.clone();
        let id_counter = id_counter.clone();
        let block_packets = block_packets.clone();
        pool.execute(Thunk::of(move || {
            let generated = generate_block_packets(&block, &program_name, &id_counter);
            block_packets.lock().unwrap().extend(generated);
        }));
    }
    pool.join();
    packets.extend(mem::take(&mut *block_packets.lock().unwrap()));

    let mut out = Trace::default();
    out.packet = packets;
    out
}

fn generate_block_packets(
    block: &RunBlock,
    program_name: &str,
    id_counter: &Arc<AtomicUsize>,
) -> Vec<TracePacket> {
    let mut packets = Vec::new();

    let process_uuid = id_counter.fetch_add(1, Ordering::Relaxed) as u64;
    let pid = block.run_index as i32 + 1;
    let mut process = ProcessDescriptor::default();
    process.set_pid(pid);
    process.set_process_name(format!("{} run {}", program_name, block.run_index));
    let mut desc = TrackDescriptor::default();
    desc.set_uuid(process_uuid);
    desc.process = Some(process).into();
    let mut packet = TracePacket::default();
    packet.set_track_descriptor(desc);
    packets.push(packet);

    // One thread track per chain seen in this block, in first-seen order so
    // the descriptor always precedes the events that reference it.
    let mut chain_uuids: Vec<(u32, u64)> = Vec::new();
    for event in &block.events {
        if chain_uuids.iter().any(|(c, _)| *c == event.chain_index) {
            continue;
        }
        let chain_uuid = id_counter.fetch_add(1, Ordering::Relaxed) as u64;
        chain_uuids.push((event.chain_index, chain_uuid));

        let mut thread = ThreadDescriptor::default();
        thread.set_pid(pid);
        thread.set_tid(event.chain_index as i32 + 1);
        thread.set_thread_name(format!("chain {}", event.chain_index));
        let mut desc = TrackDescriptor::default();
        desc.set_uuid(chain_uuid);
        desc.set_parent_uuid(process_uuid);
        desc.thread = Some(thread).into();
        let mut packet = TracePacket::default();
        packet.set_track_descriptor(desc);
        packets.push(packet);
    }

    let seq = id_counter.fetch_add(1, Ordering::Relaxed) as u32;
    for event in &block.events {
        let track_uuid = chain_uuids
            .iter()
            .find(|(c, _)| *c == event.chain_index)
            .map(|(_, u)| *u)
            .unwrap();

        let mut tevent = TrackEvent::default();
        tevent.set_type(Type::TYPE_SLICE_BEGIN);
        tevent.set_name(event.name.clone());
        tevent.set_track_uuid(track_uuid);
        let mut packet = TracePacket::default();
        packet.set_timestamp(event.start_ns);
        packet.set_track_event(tevent);
        packet.set_trusted_packet_sequence_id(seq);
        packets.push(packet);

        let mut tevent = TrackEvent::default();
        tevent.set_type(Type::TYPE_SLICE_END);
        tevent.set_name(event.name.clone());
        tevent.set_track_uuid(track_uuid);
        let mut packet = TracePacket::default();
        packet.set_timestamp(event.end_ns);
        packet.set_track_event(tevent);
        packet.set_trusted_packet_sequence_id(seq);
        packets.push(packet);
    }
    packets
}

/// Convert a runtime trace and write it as a Perfetto trace file.
pub fn write_trace_file(trace: &RunTrace, path: &Path) -> Result<()> {
    let generated = generate_trace(trace);
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    generated
        .write_to_writer(&mut file)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::ProfileEvent;

    fn sample_trace(runs: usize, events_per_run: usize) -> RunTrace {
        let mut trace = RunTrace {
            session_id: 7,
            program_name: "mlp".to_string(),
            runs: Vec::new(),
        };
        for run in 0..runs {
            let events = (0..events_per_run)
                .map(|i| ProfileEvent {
                    name: format!("inst{}", i),
                    instruction_id: i as u32,
                    chain_index: 0,
                    start_ns: (run * 1000 + i * 10) as u64,
                    end_ns: (run * 1000 + i * 10 + 5) as u64,
                    delegate: None,
                })
                .collect();
            trace.runs.push(RunBlock {
                run_index: run as u32,
                events,
            });
        }
        trace
    }

    #[test]
    fn test_packet_counts() {
        let trace = sample_trace(2, 3);
        let generated = generate_trace(&trace);

        // Root descriptor, plus per run block: one process descriptor, one
        // chain descriptor, and a begin/end pair per event.
        assert_eq!(generated.packet.len(), 1 + 2 * (1 + 1 + 2 * 3));

        let descriptors = generated
            .packet
            .iter()
            .filter(|p| p.has_track_descriptor())
            .count();
        assert_eq!(descriptors, 1 + 2 * 2);
        let events = generated
            .packet
            .iter()
            .filter(|p| p.has_track_event())
            .count();
        assert_eq!(events, 2 * 2 * 3);
    }

    #[test]
    fn test_events_reference_known_tracks() {
        let trace = sample_trace(1, 4);
        let generated = generate_trace(&trace);

        let uuids: Vec<u64> = generated
            .packet
            .iter()
            .filter(|p| p.has_track_descriptor())
            .map(|p| p.track_descriptor().uuid())
            .collect();
        for packet in generated.packet.iter().filter(|p| p.has_track_event()) {
            assert!(uuids.contains(&packet.track_event().track_uuid()));
        }
    }

    #[test]
    fn test_empty_trace_has_only_root() {
        let generated = generate_trace(&sample_trace(0, 0));
        assert_eq!(generated.packet.len(), 1);
        assert!(generated.packet[0].has_track_descriptor());
    }

    #[test]
    fn test_slice_timestamps() {
        let trace = sample_trace(1, 1);
        let generated = generate_trace(&trace);
        let slices: Vec<&TracePacket> = generated
            .packet
            .iter()
            .filter(|p| p.has_track_event())
            .collect();
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].timestamp(), 0);
        assert_eq!(slices[1].timestamp(), 5);
    }
}
