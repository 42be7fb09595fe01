use crate::cartridge::Cartridge;

/// Plain ROM cart, optionally with a single RAM chip and no banking.
///
/// There is no enable register on these carts, so RAM is always
/// accessible when present.
#[derive(Debug)]
pub struct Mbc0;

impl Mbc0 {
  pub fn rb(&self, cart: &Cartridge, addr: u16) -> u8 {
    match addr >> 12 {
      0x0..=0x7 => cart.rom()[addr as usize & (cart.rom_size() - 1)],
      0xa..=0xb => match cart.ram_size() {
        0 => 0xff,
        size => cart.ram()[(addr & 0x1fff) as usize & (size - 1)],
      },
      _ => panic!("Invalid address to MBC: 0x{:04x}", addr),
    }
  }

  pub fn wb(&mut self, cart: &mut Cartridge, addr: u16, value: u8) {
    match addr >> 12 {
      0x0..=0x7 => (),
      0xa..=0xb => {
        let size = cart.ram_size();
        if size != 0 {
          cart.ram_mut()[(addr & 0x1fff) as usize & (size - 1)] = value;
        }
      }
      _ => panic!("Invalid address to MBC: 0x{:04x}", addr),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cartridge::tests::rom_image;

  #[test]
  fn rom_is_flat_and_read_only() {
    let mut rom = rom_image(0x00, 0, 0, "");
    rom[0x0100] = 0x11;
    rom[0x7abc] = 0x22;
    let mut cart = Cartridge::new(rom).unwrap();
    let mut mbc = Mbc0;

    mbc.wb(&mut cart, 0x2000, 0x05);
    assert_eq!(mbc.rb(&cart, 0x0100), 0x11);
    assert_eq!(mbc.rb(&cart, 0x7abc), 0x22);
  }

  #[test]
  fn ram_needs_no_enable() {
    let mut cart = Cartridge::new(rom_image(0x08, 0, 0x02, "")).unwrap();
    let mut mbc = Mbc0;
    mbc.wb(&mut cart, 0xa010, 0x42);
    assert_eq!(mbc.rb(&cart, 0xa010), 0x42);
    assert_eq!(cart.ram()[0x10], 0x42);
  }

  #[test]
  fn missing_ram_reads_open_bus() {
    let mut cart = Cartridge::new(rom_image(0x00, 0, 0, "")).unwrap();
    let mut mbc = Mbc0;
    mbc.wb(&mut cart, 0xa000, 0x42);
    assert_eq!(mbc.rb(&cart, 0xa000), 0xff);
  }
}
