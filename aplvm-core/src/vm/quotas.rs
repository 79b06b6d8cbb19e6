//! Resource quotas: fatal, non-recoverable limits on I/O volume, files
//! written, CPU time, and model calls per run.

use crate::errors::AplError;

#[derive(Debug, Clone, Copy)]
pub struct QuotaLimits {
    pub io_bytes: u64,
    pub files_written: u64,
    pub cpu_ms: u64,
    pub model_calls: u64,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        QuotaLimits {
            io_bytes: 50 * 1024 * 1024,
            files_written: 100,
            cpu_ms: 30_000,
            model_calls: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct QuotaTotals {
    io_bytes: u64,
    files_written: u64,
    cpu_ms: u64,
    model_calls: u64,
}

#[derive(Debug, Clone)]
pub struct Quotas {
    limits: QuotaLimits,
    totals: QuotaTotals,
}

impl Quotas {
    pub fn new(limits: QuotaLimits) -> Self {
        Quotas { limits, totals: QuotaTotals::default() }
    }

    pub fn charge_io(&mut self, bytes: u64) -> Result<(), AplError> {
        self.totals.io_bytes += bytes;
        if self.totals.io_bytes > self.limits.io_bytes {
            return Err(AplError::quota_exceeded("io_bytes", self.totals.io_bytes, self.limits.io_bytes));
        }
        Ok(())
    }

    pub fn charge_file_write(&mut self) -> Result<(), AplError> {
        self.totals.files_written += 1;
        if self.totals.files_written > self.limits.files_written {
            return Err(AplError::quota_exceeded(
                "files_written",
                self.totals.files_written,
                self.limits.files_written,
            ));
        }
        Ok(())
    }

    pub fn charge_cpu_ms(&mut self, amount: u64) -> Result<(), AplError> {
        self.totals.cpu_ms += amount;
        if self.totals.cpu_ms > self.limits.cpu_ms {
            return Err(AplError::quota_exceeded("cpu_ms", self.totals.cpu_ms, self.limits.cpu_ms));
        }
        Ok(())
    }

    pub fn charge_model_call(&mut self) -> Result<(), AplError> {
        self.totals.model_calls += 1;
        if self.totals.model_calls > self.limits.model_calls {
            return Err(AplError::quota_exceeded(
                "model_calls",
                self.totals.model_calls,
                self.limits.model_calls,
            ));
        }
        Ok(())
    }
}
