//! engine/driver.rs
//! Issues the transfer -> compute -> transfer chain of every (iteration,
//! engine) pair without ever waiting.
//!
//! Submission order is iteration-major so that all engines get their first
//! iteration in flight before anyone's second. Ordering inside a chain and
//! across chains that share a buffer set comes from the buffer arena.

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, info};

use crate::backend::{CompressionBackend, GzipOutInfo, OutStatus};
use crate::constants::{METADATA_RECORD_LEN, PARTIAL_CRC_LEN};
use crate::engine::slot::{ReadbackCell, SlotHandles, SlotReadback, SlotSubmission, SlotTable};
use crate::memory::{BufferPool, InputImage, WorkSlot};
use crate::substrate::{Accessors, BufferId, CommandError, CommandGroup, Device, Event};
use crate::telemetry::{Stage, StageTimes};
use crate::types::AccelResult;

fn ensure_capacity(id: BufferId, capacity: usize, needed: usize) -> Result<(), CommandError> {
    if needed > capacity {
        return Err(CommandError::OutOfBounds { id, needed, capacity });
    }
    Ok(())
}

pub struct PipelineDriver<'d> {
    device: &'d Device,
    backend: Arc<dyn CompressionBackend>,
}

impl<'d> PipelineDriver<'d> {
    pub fn new(device: &'d Device, backend: Arc<dyn CompressionBackend>) -> Self {
        Self { device, backend }
    }

    pub fn backend(&self) -> &Arc<dyn CompressionBackend> {
        &self.backend
    }

    /// Acquire the buffers of every slot, iteration-major.
    ///
    /// Runs before anything is submitted, so an allocation failure leaves no
    /// command in flight.
    pub fn acquire_all(
        &self,
        pool: &mut BufferPool,
        input: &Arc<InputImage>,
        engines: usize,
        iterations: usize,
    ) -> AccelResult<Vec<WorkSlot>> {
        let mut slots = Vec::with_capacity(engines * iterations);
        for iteration in 0..iterations {
            for engine in 0..engines {
                slots.push(pool.acquire(engine, iteration, input)?);
            }
        }
        debug!(
            "[DRIVER] acquired {} slots over {} engines ({} sets each)",
            slots.len(),
            engines,
            (0..engines).map(|e| pool.distinct_sets(e)).max().unwrap_or(0)
        );
        Ok(slots)
    }

    /// Submit the four commands of every slot. Never blocks.
    pub fn submit_all(
        &self,
        slots: Vec<WorkSlot>,
        engines: usize,
        iterations: usize,
    ) -> AccelResult<SlotTable> {
        let mut table = SlotTable::new(engines, iterations);
        let count = slots.len();
        for slot in slots {
            table.insert(self.submit_slot(slot)?);
        }
        info!("[DRIVER] submitted {} chains to {}", count, self.device.name());
        Ok(table)
    }

    /// Submit one slot's chain: input H2D, compute, output D2H, metadata D2H.
    pub fn submit_slot(&self, slot: WorkSlot) -> AccelResult<SlotSubmission> {
        let readback = ReadbackCell::default();
        let handles = SlotHandles {
            input: self.submit_input(&slot)?,
            compute: self.submit_compute(&slot)?,
            output: self.submit_output(&slot)?,
            metadata: self.submit_metadata(&slot, readback.clone())?,
        };
        Ok(SlotSubmission { slot, handles, readback })
    }

    fn submit_input(&self, slot: &WorkSlot) -> AccelResult<Event> {
        let dst = slot.set.device_input;
        let image = slot.input.clone();
        let group = CommandGroup::new(Stage::InputTransfer).discard_write(dst);

        let event = self.device.queue().submit(group, move |acc: &Accessors| {
            let src = image.as_bytes();
            let mut buf = acc.write(dst)?;
            ensure_capacity(dst, buf.len(), src.len())?;
            buf[..src.len()].copy_from_slice(src);
            Ok(StageTimes::default())
        })?;
        Ok(event)
    }

    fn submit_compute(&self, slot: &WorkSlot) -> AccelResult<Event> {
        let set = slot.set;
        let input_len = slot.input.len();
        let backend = self.backend.clone();
        let group = CommandGroup::new(Stage::Compute)
            .read(set.device_input)
            .write(set.device_output)
            .write(set.device_metadata)
            .write(set.device_crc);

        let event = self.device.queue().submit(group, move |acc: &Accessors| {
            let block = {
                let input = acc.read(set.device_input)?;
                ensure_capacity(set.device_input, input.len(), input_len)?;
                backend.compress(&input[..input_len])?
            };

            // Whatever does not fit is dropped and flagged.
            let mut status = OutStatus::VALID;
            {
                let mut out = acc.write(set.device_output)?;
                let n = block.len().min(out.len());
                if n < block.len() {
                    status |= OutStatus::OVERFLOW;
                }
                out[..n].copy_from_slice(&block.data[..n]);
            }

            let info = GzipOutInfo::new(block.len() as u64, status);
            let mut meta = acc.write(set.device_metadata)?;
            ensure_capacity(set.device_metadata, meta.len(), METADATA_RECORD_LEN)?;
            meta[..METADATA_RECORD_LEN].copy_from_slice(info.as_bytes());

            let mut crc = acc.write(set.device_crc)?;
            ensure_capacity(set.device_crc, crc.len(), PARTIAL_CRC_LEN)?;
            LittleEndian::write_u32(&mut crc[..PARTIAL_CRC_LEN], block.partial_crc);

            Ok(block.sub_stages)
        })?;
        Ok(event)
    }

    fn submit_output(&self, slot: &WorkSlot) -> AccelResult<Event> {
        let set = slot.set;
        let group = CommandGroup::new(Stage::OutputTransfer)
            .read(set.device_output)
            .write(set.host_output);

        // Size is unknown until the metadata lands, so the whole buffer moves.
        let event = self.device.queue().submit(group, move |acc: &Accessors| {
            let src = acc.read(set.device_output)?;
            let mut dst = acc.write(set.host_output)?;
            ensure_capacity(set.host_output, dst.len(), src.len())?;
            dst[..src.len()].copy_from_slice(&src);
            Ok(StageTimes::default())
        })?;
        Ok(event)
    }

    fn submit_metadata(&self, slot: &WorkSlot, readback: ReadbackCell) -> AccelResult<Event> {
        let set = slot.set;
        let group = CommandGroup::new(Stage::MetadataTransfer)
            .read(set.device_metadata)
            .read(set.device_crc);

        let event = self.device.queue().submit(group, move |acc: &Accessors| {
            let meta = acc.read(set.device_metadata)?;
            let info = GzipOutInfo::read_from(&meta).ok_or(CommandError::OutOfBounds {
                id: set.device_metadata,
                needed: METADATA_RECORD_LEN,
                capacity: meta.len(),
            })?;
            let crc = acc.read(set.device_crc)?;
            ensure_capacity(set.device_crc, crc.len(), PARTIAL_CRC_LEN)?;
            let partial_crc = LittleEndian::read_u32(&crc[..PARTIAL_CRC_LEN]);

            readback.store(SlotReadback::from_device(info, partial_crc));
            Ok(StageTimes::default())
        })?;
        Ok(event)
    }
}
