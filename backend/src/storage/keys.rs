/// Fixed identifiers under which the counter state is persisted.
///
/// The string forms are shared with existing on-device data and must stay
/// stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    CounterStartDate,
    CounterDailyAmount,
    CounterWithdrawalHistory,
    ThemeMode,
}

impl StorageKey {
    pub const fn as_str(&self) -> &'static str {
        match self {
            StorageKey::CounterStartDate => "counterStartDate",
            StorageKey::CounterDailyAmount => "counterDailyAmount",
            StorageKey::CounterWithdrawalHistory => "counterWithdrawalHistory",
            StorageKey::ThemeMode => "themeMode",
        }
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
