use std::time::Duration;

/// Error types for the actuator link.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ActuatorError {
    /// The underlying port failed.
    #[error("Actuator port failure")]
    Io(#[from] std::io::Error),

    /// The reply is shorter than the command echo that was expected.
    #[error("Short reply: expected {expected} bytes, got {actual}")]
    ShortReply {
        /// The expected number of bytes.
        expected: usize,
        /// The number of bytes received.
        actual: usize,
    },
}

/// Byte oriented device, e.g. a microcontroller behind a serial port.
pub trait Actuator {
    /// Write bytes to the device.
    fn send(&mut self, data: &[u8]) -> Result<(), ActuatorError>;

    /// Number of bytes waiting to be read.
    fn bytes_available(&mut self) -> Result<usize, ActuatorError>;

    /// Read up to `max_len` pending bytes.
    fn receive(&mut self, max_len: usize) -> Result<Vec<u8>, ActuatorError>;
}

/// Echo of a motor command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorReply {
    /// The motor id as echoed by the device.
    pub motor_id: Vec<u8>,
    /// The angle as echoed by the device.
    pub degree: Vec<u8>,
}

/// Command helper doing one send, a fixed settle delay and one read per command.
///
/// Nothing is retried.
#[derive(Debug)]
pub struct ActuatorLink<A> {
    actuator: A,
    settle: Duration,
}

impl<A: Actuator> ActuatorLink<A> {
    /// Wrap a device with the delay to wait between a command and its reply.
    pub fn new(actuator: A, settle: Duration) -> Self {
        Self { actuator, settle }
    }

    /// The settle delay.
    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Access the wrapped device.
    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }

    /// Send `data` and read back as many bytes as were sent.
    pub fn round_trip(&mut self, data: &[u8]) -> Result<Vec<u8>, ActuatorError> {
        self.actuator.send(data)?;
        std::thread::sleep(self.settle);
        let reply = self.actuator.receive(data.len())?;
        log::debug!("actuator: sent {} bytes, received {}", data.len(), reply.len());
        Ok(reply)
    }

    /// Send `data` and report how many bytes the device answered with.
    ///
    /// The pending reply is consumed.
    pub fn query_byte_count(&mut self, data: &[u8]) -> Result<usize, ActuatorError> {
        self.actuator.send(data)?;
        std::thread::sleep(self.settle);
        let available = self.actuator.bytes_available()?;
        self.actuator.receive(available)?;
        Ok(available)
    }

    /// Send a motor id followed by an angle and read both echoes.
    pub fn control_motor(&mut self, motor_id: &str, degree: &str) -> Result<MotorReply, ActuatorError> {
        self.actuator.send(motor_id.as_bytes())?;
        self.actuator.send(degree.as_bytes())?;
        std::thread::sleep(self.settle);

        let read_exact = |actuator: &mut A, expected: usize| -> Result<Vec<u8>, ActuatorError> {
            let reply = actuator.receive(expected)?;
            if reply.len() < expected {
                return Err(ActuatorError::ShortReply {
                    expected,
                    actual: reply.len(),
                });
            }
            Ok(reply)
        };
        let motor_id = read_exact(&mut self.actuator, motor_id.len())?;
        let degree = read_exact(&mut self.actuator, degree.len())?;
        log::info!(
            "actuator: motor {} to {}",
            String::from_utf8_lossy(&motor_id),
            String::from_utf8_lossy(&degree)
        );
        Ok(MotorReply { motor_id, degree })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Echoes everything it receives and counts the writes.
    #[derive(Default)]
    struct EchoDevice {
        buffer: VecDeque<u8>,
        sends: usize,
    }

    impl Actuator for EchoDevice {
        fn send(&mut self, data: &[u8]) -> Result<(), ActuatorError> {
            self.sends += 1;
            self.buffer.extend(data);
            Ok(())
        }

        fn bytes_available(&mut self) -> Result<usize, ActuatorError> {
            Ok(self.buffer.len())
        }

        fn receive(&mut self, max_len: usize) -> Result<Vec<u8>, ActuatorError> {
            let n = max_len.min(self.buffer.len());
            Ok(self.buffer.drain(..n).collect())
        }
    }

    #[test]
    fn test_round_trip_and_byte_count() -> Result<(), ActuatorError> {
        let mut link = ActuatorLink::new(EchoDevice::default(), Duration::ZERO);
        assert_eq!(link.round_trip(b"ping")?, b"ping");
        assert_eq!(link.query_byte_count(b"hello")?, 5);
        assert_eq!(link.actuator_mut().bytes_available()?, 0);
        assert_eq!(link.actuator_mut().sends, 2);
        Ok(())
    }

    #[test]
    fn test_control_motor_echo() -> Result<(), ActuatorError> {
        let mut link = ActuatorLink::new(EchoDevice::default(), Duration::from_millis(1));
        let reply = link.control_motor("2", "90")?;
        assert_eq!(reply.motor_id, b"2");
        assert_eq!(reply.degree, b"90");
        assert_eq!(link.actuator_mut().sends, 2);
        Ok(())
    }

    #[test]
    fn test_short_reply_is_not_retried() {
        struct Silent(usize);
        impl Actuator for Silent {
            fn send(&mut self, _data: &[u8]) -> Result<(), ActuatorError> {
                self.0 += 1;
                Ok(())
            }
            fn bytes_available(&mut self) -> Result<usize, ActuatorError> {
                Ok(0)
            }
            fn receive(&mut self, _max_len: usize) -> Result<Vec<u8>, ActuatorError> {
                Ok(Vec::new())
            }
        }

        let mut link = ActuatorLink::new(Silent(0), Duration::ZERO);
        assert!(matches!(
            link.control_motor("1", "45"),
            Err(ActuatorError::ShortReply { expected: 1, actual: 0 })
        ));
        assert_eq!(link.actuator_mut().0, 2);
    }
}
