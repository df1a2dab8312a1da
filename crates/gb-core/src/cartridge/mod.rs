pub mod header;
pub mod mbc;
pub mod mbc0;
pub mod mbc1;

use self::header::{Header, MbcKind};
use crate::cartridge::mbc::MbcEnum;

#[derive(Debug, Clone)]
pub enum CartridgeError {
    HeaderParse(header::HeaderError),
    RomTooSmall { declared: usize, actual: usize },
}

impl std::fmt::Display for CartridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CartridgeError::HeaderParse(e) => write!(f, "invalid cartridge header: {e}"),
            CartridgeError::RomTooSmall { declared, actual } => write!(
                f,
                "ROM image is smaller than its declared size (declared {declared} bytes, got {actual})"
            ),
        }
    }
}

pub struct Cartridge {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub header: Header,
    pub mbc: MbcEnum,
}

impl Cartridge {
    pub fn from_rom(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        let header = Header::parse(&rom).map_err(CartridgeError::HeaderParse)?;

        let declared = header.rom_size.byte_len();
        if rom.len() < declared {
            return Err(CartridgeError::RomTooSmall {
                declared,
                actual: rom.len(),
            });
        }

        let ram = vec![0; header.ram_size.byte_len()];

        let mbc = match header.cartridge_type.mbc_kind() {
            MbcKind::RomOnly => MbcEnum::Mbc0(mbc0::Mbc0),
            MbcKind::Mbc1 => MbcEnum::Mbc1(mbc1::Mbc1::new()),
            MbcKind::Unsupported => {
                log::warn!(
                    "cartridge type {:?} is not emulated; running best-effort as a fixed ROM",
                    header.cartridge_type
                );
                MbcEnum::Mbc0(mbc0::Mbc0)
            }
        };

        Ok(Self {
            rom,
            ram,
            header,
            mbc,
        })
    }
}
