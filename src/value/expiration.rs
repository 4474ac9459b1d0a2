//! Parses the `EX`/`PX`/`EXAT`/`PXAT` family of expiration arguments into an
//! absolute wall-clock duration since the Unix epoch.
use super::bytes_to_int;
use crate::{error::Error, time::now};
use std::{convert::TryInto, time::Duration};

pub struct Expiration {
    millis: u64,
    pub is_negative: bool,
    command: String,
}

impl Expiration {
    /// `is_milliseconds` selects PX/PXAT vs EX/EXAT; `is_absolute` selects
    /// the *AT variants (timestamp) vs the relative ones (offset from now).
    pub fn new(
        bytes: &[u8],
        is_milliseconds: bool,
        is_absolute: bool,
        command: &[u8],
    ) -> Result<Self, Error> {
        let command = String::from_utf8_lossy(command).to_lowercase();
        let input = bytes_to_int::<i64>(bytes)?;
        let millis = if is_milliseconds {
            input
        } else {
            input
                .checked_mul(1_000)
                .ok_or_else(|| Error::InvalidExpire(command.to_string()))?
        };

        let base_time = now().as_millis() as i64;

        let millis = if is_absolute {
            millis
                .checked_sub(base_time)
                .ok_or_else(|| Error::InvalidExpire(command.to_string()))?
        } else {
            if millis.checked_add(base_time).is_none() {
                return Err(Error::InvalidExpire(command.to_string()));
            }
            millis
        };

        Ok(Expiration {
            millis: millis.unsigned_abs() as u64,
            is_negative: millis.is_negative(),
            command,
        })
    }
}

impl TryInto<Duration> for Expiration {
    type Error = Error;

    fn try_into(self) -> Result<Duration, Self::Error> {
        if self.is_negative {
            Err(Error::InvalidExpire(self.command))
        } else {
            Ok(Duration::from_millis(self.millis))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn relative_seconds() {
        let e = Expiration::new(b"10", false, false, b"expire").unwrap();
        let d: Duration = e.try_into().unwrap();
        assert!(d.as_secs() >= 9 && d.as_secs() <= 11);
    }

    #[test]
    fn negative_is_rejected_as_duration() {
        let e = Expiration::new(b"-10", false, false, b"expire").unwrap();
        assert!(e.is_negative);
        let d: Result<Duration, _> = e.try_into();
        assert!(d.is_err());
    }
}
