//! Closed opcode table shared by the code builder, front ends and the
//! dispatcher. Discriminants are part of the public contract; append only.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Command {
    #[default]
    Null = 0,
    DecryptFile,
    ResignSave,
    DownloadUsb,
    DownloadHdd,
    CopySaveUsb,
    CopySaveHdd,
    ExportZipUsb,
    ViewDetails,
    ViewRawPatch,
    ResignVmp,
    ExpFingerprint,
    HexEditFile,
    ImportDataFile,
    DeleteSave,
    UploadSave,
    ResignSaves,
    ResignAllSaves,
    CopySavesUsb,
    CopyAllSavesUsb,
    CopySavesHdd,
    CopyAllSavesHdd,
    DumpFingerprints,
    SaveWebserver,
    ConvIso2Cso,
    SetupPlugin,
    ExpVmp2Mcr,
    ExpPspKey,
    DumpPspKey,
    ExpVmcSave,
    ExpSavesVmc,
    ExpAllSavesVmc,
    ConvCso2Iso,
    ImpMcr2Vmp,
    ImpVmcSave,
    ExtractArchive,
    UrlDownload,
    NetWebserver,
    ChangeTitleId,
}

impl Command {
    const ALL: [Command; 39] = [
        Command::Null,
        Command::DecryptFile,
        Command::ResignSave,
        Command::DownloadUsb,
        Command::DownloadHdd,
        Command::CopySaveUsb,
        Command::CopySaveHdd,
        Command::ExportZipUsb,
        Command::ViewDetails,
        Command::ViewRawPatch,
        Command::ResignVmp,
        Command::ExpFingerprint,
        Command::HexEditFile,
        Command::ImportDataFile,
        Command::DeleteSave,
        Command::UploadSave,
        Command::ResignSaves,
        Command::ResignAllSaves,
        Command::CopySavesUsb,
        Command::CopyAllSavesUsb,
        Command::CopySavesHdd,
        Command::CopyAllSavesHdd,
        Command::DumpFingerprints,
        Command::SaveWebserver,
        Command::ConvIso2Cso,
        Command::SetupPlugin,
        Command::ExpVmp2Mcr,
        Command::ExpPspKey,
        Command::DumpPspKey,
        Command::ExpVmcSave,
        Command::ExpSavesVmc,
        Command::ExpAllSavesVmc,
        Command::ConvCso2Iso,
        Command::ImpMcr2Vmp,
        Command::ImpVmcSave,
        Command::ExtractArchive,
        Command::UrlDownload,
        Command::NetWebserver,
        Command::ChangeTitleId,
    ];

    pub const fn byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        Self::ALL.get(b as usize).copied()
    }
}

/// Opcode plus its single argument byte (storage target, slot or enable flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Opcode {
    pub command: Command,
    pub arg: u8,
}

impl Opcode {
    pub const fn new(command: Command) -> Self {
        Self { command, arg: 0 }
    }

    pub const fn with_arg(command: Command, arg: u8) -> Self {
        Self { command, arg }
    }

    pub fn to_bytes(self) -> [u8; 2] {
        [self.command.byte(), self.arg]
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let command = Command::from_byte(*bytes.first()?)?;
        Some(Self {
            command,
            arg: bytes.get(1).copied().unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbering_is_stable() {
        assert_eq!(Command::DecryptFile.byte(), 1);
        assert_eq!(Command::DeleteSave.byte(), 14);
        assert_eq!(Command::SaveWebserver.byte(), 23);
        assert_eq!(Command::NetWebserver.byte(), 37);
        assert_eq!(Command::ChangeTitleId.byte(), 38);
    }

    #[test]
    fn test_table_matches_discriminants() {
        for (i, c) in Command::ALL.iter().enumerate() {
            assert_eq!(c.byte() as usize, i);
        }
        assert_eq!(Command::from_byte(39), None);
    }

    #[test]
    fn test_opcode_bytes() {
        let op = Opcode::with_arg(Command::CopySaveUsb, 1);
        assert_eq!(Opcode::from_bytes(&op.to_bytes()), Some(op));
        assert_eq!(
            Opcode::from_bytes(&[Command::ViewDetails.byte()]),
            Some(Opcode::new(Command::ViewDetails))
        );
        assert_eq!(Opcode::from_bytes(&[]), None);
    }
}
