#[cfg(test)]
mod substrate_tests {
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use accel_gzip_core::memory::{Allocator, MemoryKind};
    use accel_gzip_core::substrate::{BufferId, CommandError, CommandGroup, Device, EventStatus, SubstrateError};
    use accel_gzip_core::telemetry::{Stage, StageTimes};

    fn buffer(device: &Device, len: usize) -> BufferId {
        let alloc = device.allocator().allocate(len, MemoryKind::Device).unwrap();
        device.arena().register(alloc, "test")
    }

    #[test]
    fn write_waits_for_earlier_readers() {
        let device = Device::emulator(4).unwrap();
        let buf = buffer(&device, 16);
        let log = Arc::new(Mutex::new(Vec::new()));

        let l = log.clone();
        device
            .queue()
            .submit(CommandGroup::new(Stage::InputTransfer).discard_write(buf), move |acc| {
                acc.write(buf)?[0] = 1;
                l.lock().unwrap().push("write-0");
                Ok(StageTimes::default())
            })
            .unwrap();

        let l = log.clone();
        let read = device
            .queue()
            .submit(CommandGroup::new(Stage::Compute).read(buf), move |acc| {
                let first = acc.read(buf)?[0];
                thread::sleep(Duration::from_millis(50));
                l.lock().unwrap().push(if first == 1 { "read-1" } else { "read-?" });
                Ok(StageTimes::default())
            })
            .unwrap();

        let l = log.clone();
        let rewrite = device
            .queue()
            .submit(CommandGroup::new(Stage::InputTransfer).discard_write(buf), move |acc| {
                acc.write(buf)?[0] = 2;
                l.lock().unwrap().push("write-1");
                Ok(StageTimes::default())
            })
            .unwrap();

        rewrite.wait().unwrap();
        assert!(read.is_done());
        assert_eq!(*log.lock().unwrap(), vec!["write-0", "read-1", "write-1"]);
        assert!(read.exec_time().unwrap() >= Duration::from_millis(50));
    }

    #[test]
    fn failure_propagates_to_dependents() {
        let device = Device::emulator(2).unwrap();
        let buf = buffer(&device, 16);

        let producer = device
            .queue()
            .submit(CommandGroup::new(Stage::Compute).write(buf), |_| {
                Err(CommandError::Panicked("stage exploded".into()))
            })
            .unwrap();
        let consumer = device
            .queue()
            .submit(CommandGroup::new(Stage::OutputTransfer).read(buf), |_| Ok(StageTimes::default()))
            .unwrap();

        assert!(producer.wait().is_err());
        match consumer.wait() {
            Err(SubstrateError::CommandFailed { stage, reason, .. }) => {
                assert_eq!(stage, Stage::OutputTransfer);
                assert!(reason.contains("dependency failed"), "{reason}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn panicking_command_fails_its_event() {
        let device = Device::emulator(1).unwrap();
        let buf = buffer(&device, 16);
        let ev = device
            .queue()
            .submit(CommandGroup::new(Stage::Compute).write(buf), |_| panic!("kernel fault"))
            .unwrap();
        let err = ev.wait().unwrap_err();
        assert!(matches!(ev.status(), EventStatus::Failed(_)));
        assert!(err.to_string().contains("kernel fault"));

        // The executor survived the panic.
        let next = device
            .queue()
            .submit(CommandGroup::new(Stage::Compute).write(buf), |_| Ok(StageTimes::default()))
            .unwrap();
        next.wait().unwrap();
    }

    #[test]
    fn undeclared_write_is_rejected() {
        let device = Device::emulator(1).unwrap();
        let buf = buffer(&device, 16);
        let ev = device
            .queue()
            .submit(CommandGroup::new(Stage::OutputTransfer).read(buf), move |acc| {
                let _guard = acc.write(buf)?;
                Ok(StageTimes::default())
            })
            .unwrap();
        let err = ev.wait().unwrap_err();
        assert!(err.to_string().contains("not declared"), "{err}");
    }

    #[test]
    fn released_buffer_cannot_be_submitted() {
        let device = Device::emulator(1).unwrap();
        let buf = buffer(&device, 16);
        assert!(device.arena().release(buf));
        let res = device
            .queue()
            .submit(CommandGroup::new(Stage::Compute).read(buf), |_| Ok(StageTimes::default()));
        assert!(matches!(res, Err(SubstrateError::UnknownBuffer(id)) if id == buf));
    }

    #[test]
    fn sub_stages_reach_the_profile() {
        let device = Device::emulator(1).unwrap();
        let buf = buffer(&device, 16);
        let ev = device
            .queue()
            .submit(CommandGroup::new(Stage::Compute).write(buf), |_| {
                let mut t = StageTimes::default();
                t.add(Stage::Crc, Duration::from_micros(3));
                Ok(t)
            })
            .unwrap();
        let profile = ev.profile().unwrap();
        assert_eq!(profile.sub_stages.get(Stage::Crc), Duration::from_micros(3));
    }
}
