// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{cell::RefCell, rc::Rc};

use crate::{Address, Exception, Quantity, Result, UnitId, Word};

/// Memory of the devices behind a server.
///
/// Every method returns `Ok(Some(_))` when done, `Ok(None)` to be polled
/// again, or an error that is answered with a Modbus exception. Unknown
/// units can be ignored by returning [`Exception::GatewayPathUnavailable`].
///
/// The default implementations answer [`Exception::IllegalFunction`].
/// Bits are packed with the first bit in the least significant bit of the
/// first byte.
#[allow(unused_variables)]
pub trait ModbusInterface {
    /// FC 1
    fn read_coils(
        &mut self,
        unit: UnitId,
        offset: Address,
        count: Quantity,
        values: &mut [u8],
    ) -> Result<Option<()>> {
        Err(Exception::IllegalFunction.into())
    }

    /// FC 2
    fn read_discrete_inputs(
        &mut self,
        unit: UnitId,
        offset: Address,
        count: Quantity,
        values: &mut [u8],
    ) -> Result<Option<()>> {
        Err(Exception::IllegalFunction.into())
    }

    /// FC 3
    fn read_holding_registers(
        &mut self,
        unit: UnitId,
        offset: Address,
        count: Quantity,
        values: &mut [Word],
    ) -> Result<Option<()>> {
        Err(Exception::IllegalFunction.into())
    }

    /// FC 4
    fn read_input_registers(
        &mut self,
        unit: UnitId,
        offset: Address,
        count: Quantity,
        values: &mut [Word],
    ) -> Result<Option<()>> {
        Err(Exception::IllegalFunction.into())
    }

    /// FC 5
    fn write_single_coil(
        &mut self,
        unit: UnitId,
        offset: Address,
        value: bool,
    ) -> Result<Option<()>> {
        Err(Exception::IllegalFunction.into())
    }

    /// FC 6
    fn write_single_register(
        &mut self,
        unit: UnitId,
        offset: Address,
        value: Word,
    ) -> Result<Option<()>> {
        Err(Exception::IllegalFunction.into())
    }

    /// FC 7
    fn read_exception_status(&mut self, unit: UnitId) -> Result<Option<u8>> {
        Err(Exception::IllegalFunction.into())
    }

    /// FC 15
    fn write_multiple_coils(
        &mut self,
        unit: UnitId,
        offset: Address,
        count: Quantity,
        values: &[u8],
    ) -> Result<Option<()>> {
        Err(Exception::IllegalFunction.into())
    }

    /// FC 16
    fn write_multiple_registers(
        &mut self,
        unit: UnitId,
        offset: Address,
        count: Quantity,
        values: &[Word],
    ) -> Result<Option<()>> {
        Err(Exception::IllegalFunction.into())
    }

    /// FC 17: fill `data` and return the number of bytes used.
    fn report_server_id(&mut self, unit: UnitId, data: &mut [u8]) -> Result<Option<usize>> {
        Err(Exception::IllegalFunction.into())
    }

    /// FC 22
    fn mask_write_register(
        &mut self,
        unit: UnitId,
        offset: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> Result<Option<()>> {
        Err(Exception::IllegalFunction.into())
    }

    /// FC 23: write `write_values`, then read into `read_values`.
    #[allow(clippy::too_many_arguments)]
    fn read_write_multiple_registers(
        &mut self,
        unit: UnitId,
        read_offset: Address,
        read_count: Quantity,
        read_values: &mut [Word],
        write_offset: Address,
        write_count: Quantity,
        write_values: &[Word],
    ) -> Result<Option<()>> {
        Err(Exception::IllegalFunction.into())
    }
}

/// A device shared by a server and all of its connections.
pub type SharedDevice = Rc<RefCell<dyn ModbusInterface>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    struct Empty;

    impl ModbusInterface for Empty {}

    #[test]
    fn unimplemented_functions_are_illegal() {
        let mut device = Empty;
        let illegal = Err(Error::Exception(Exception::IllegalFunction));
        assert_eq!(device.read_coils(1, 0, 1, &mut [0]), illegal);
        assert_eq!(device.read_holding_registers(1, 0, 1, &mut [0]), illegal);
        assert_eq!(device.write_single_coil(1, 0, true), illegal);
        assert_eq!(device.write_multiple_registers(1, 0, 1, &[0]), illegal);
        assert_eq!(
            device.read_exception_status(1),
            Err(Error::Exception(Exception::IllegalFunction))
        );
        assert_eq!(
            device.report_server_id(1, &mut [0; 4]),
            Err(Error::Exception(Exception::IllegalFunction))
        );
    }
}
