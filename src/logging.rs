//! Journal logging shared by the binaries (`journalctl --user -t dayroll -f`).

/// Crate targets pass at info, or debug when toggled; everything else at warn.
struct FilteredJournal {
    inner: systemd_journal_logger::JournalLog,
}

impl log::Log for FilteredJournal {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        if metadata.target().starts_with("dayroll") {
            let max = if crate::debug_logging() {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Info
            };
            metadata.level() <= max
        } else {
            metadata.level() <= log::LevelFilter::Warn
        }
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            self.inner.log(record);
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Without a journal socket (containers, non-systemd hosts) logging stays off.
pub fn install(identifier: &str, debug: bool) -> Result<(), Box<dyn std::error::Error>> {
    crate::set_debug_logging(debug);

    let journal = match systemd_journal_logger::JournalLog::new() {
        Ok(journal) => journal.with_syslog_identifier(identifier.to_string()),
        Err(e) => {
            eprintln!("{}: journal unavailable, logging disabled: {}", identifier, e);
            return Ok(());
        }
    };

    log::set_boxed_logger(Box::new(FilteredJournal { inner: journal }))?;
    // Debug so crate debug logs can pass once toggled.
    log::set_max_level(log::LevelFilter::Debug);
    Ok(())
}
