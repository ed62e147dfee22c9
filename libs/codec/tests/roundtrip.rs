//! Round-trip property: decode(encode(h)) == h for every header variant
//! over its full field domain, including both CommHeader layout versions.

use bytes::BytesMut;
use codec::{
    AssignHeader, CmdHeader, CommHeader, FactoryHeader, IfHeader, LogicalOperator, MeasOutHeader,
    MessageHeader, OperandKind, RotationHeader, TargetQubitHeader, TimeInfoHeader, TypeHeader, Wire,
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn message_header_roundtrip(version: u8, msg_type: u8, app_id: u16, length: u32) {
        let hdr = MessageHeader { version, msg_type, app_id, length };
        prop_assert_eq!(MessageHeader::decode(&hdr.encode()).unwrap(), hdr);
    }

    #[test]
    fn cmd_header_roundtrip(qubit_id: u16, instr: u8, notify: bool, block: bool, action: bool) {
        let hdr = CmdHeader { qubit_id, instr, notify, block, action };
        prop_assert_eq!(CmdHeader::decode(&hdr.encode()).unwrap(), hdr);
    }

    #[test]
    fn comm_header_roundtrip_per_version(
        remote_app_id: u16,
        remote_node: u32,
        remote_port: u16,
        version in 0u8..=2,
    ) {
        let hdr = CommHeader { remote_app_id, remote_node, remote_port };
        let mut buf = BytesMut::new();
        hdr.encode_into(&mut buf, version).unwrap();
        prop_assert_eq!(buf.len(), CommHeader::WIRE_SIZE);
        prop_assert_eq!(CommHeader::decode(&buf, version).unwrap(), hdr);
    }

    #[test]
    fn factory_header_roundtrip(num_iter: u8, notify: bool, block: bool) {
        let hdr = FactoryHeader { num_iter, notify, block };
        prop_assert_eq!(FactoryHeader::decode(&hdr.encode()).unwrap(), hdr);
    }

    #[test]
    fn type_header_roundtrip(msg_type: u8, length: u32) {
        let hdr = TypeHeader { msg_type, length };
        prop_assert_eq!(TypeHeader::decode(&hdr.encode()).unwrap(), hdr);
    }

    #[test]
    fn if_header_roundtrip(
        first_operand: u32,
        second_operand: u32,
        body_length: u32,
        eq: bool,
        by_ref: bool,
    ) {
        let hdr = IfHeader {
            first_operand,
            operator: if eq { LogicalOperator::Eq } else { LogicalOperator::Neq },
            second_operand_kind: if by_ref { OperandKind::Ref } else { OperandKind::Value },
            second_operand,
            body_length,
        };
        prop_assert_eq!(IfHeader::decode(&hdr.encode()).unwrap(), hdr);
    }

    #[test]
    fn small_headers_roundtrip(qubit_id: u16, step: u8, ref_id: u32, outcome: u8, datetime: u64) {
        let q = TargetQubitHeader { qubit_id };
        prop_assert_eq!(TargetQubitHeader::decode(&q.encode()).unwrap(), q);

        let r = RotationHeader { step };
        prop_assert_eq!(RotationHeader::decode(&r.encode()).unwrap(), r);

        let a = AssignHeader { ref_id };
        prop_assert_eq!(AssignHeader::decode(&a.encode()).unwrap(), a);

        let m = MeasOutHeader { outcome };
        prop_assert_eq!(MeasOutHeader::decode(&m.encode()).unwrap(), m);

        let t = TimeInfoHeader { datetime };
        prop_assert_eq!(TimeInfoHeader::decode(&t.encode()).unwrap(), t);
    }
}
