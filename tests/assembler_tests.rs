use otto::isa;
use otto::{assemble, Program};

fn assemble_clean(src: &str) -> Program {
    let program = assemble(src);
    assert!(
        !program.has_errors(),
        "unexpected diagnostics: {:?}",
        program.diagnostics
    );
    program
}

#[test]
fn label_resolution_end_to_end() {
    let program = assemble_clean(
        "ORG 8000H\n\
         START: MVI A,00H\n\
         JMP DONE\n\
         MVI A,0FFH\n\
         DONE: HLT\n",
    );
    assert!(program.diagnostics.is_empty());
    assert_eq!(program.address_for_label("START"), Some(0x8000));
    assert_eq!(program.address_for_label("DONE"), Some(0x8007));
    // Two-byte operand is DONE's address, little-endian
    assert_eq!(&program.memory[0x8002..0x8005], &[0xC3, 0x07, 0x80]);
    // Both ends of the map link back to the source
    assert_eq!(program.addr_to_line[&0x8002], 3);
    assert_eq!(program.line_to_addr[&5], (0x8007, 1));
    assert_eq!(program.addr_to_line[&0x8007], 5);
}

#[test]
fn error_recovery_keeps_assembling() {
    let program = assemble(
        "MVI A,01H\n\
         UNKNOWN_OP\n\
         MVI B,02H\n\
         HLT\n",
    );
    assert_eq!(program.error_count(), 1);
    assert_eq!(program.diagnostics[0].code, "asm::unknown_mnemonic");
    assert_eq!(program.diagnostics[0].span.line(), 2);
    // The unknown line held 3 bytes, so later addresses are stable
    assert_eq!(program.line_to_addr[&3], (0x0005, 2));
    assert_eq!(program.line_to_addr[&4], (0x0007, 1));
    // And the rest still assembled and is runnable
    assert_eq!(program.memory[0x0005], 0x06);
    assert_eq!(program.memory[0x0007], 0x76);
}

#[test]
fn line_to_addr_brackets_every_emitting_line() {
    let src = "ORG 100H\nMVI A,1\nLXI H,2000H\nDB 1,2,3\nHLT\n";
    let program = assemble_clean(src);
    let expected: &[(u32, u16, u16)] = &[(2, 0x100, 2), (3, 0x102, 3), (4, 0x105, 3), (5, 0x108, 1)];
    for (line, start, len) in expected {
        assert_eq!(program.line_to_addr[line], (*start, *len), "line {line}");
    }
    // The bytes under each bracket match the listing rows
    for row in &program.listing {
        let start = row.addr as usize;
        assert_eq!(
            &program.memory[start..start + row.bytes.len()],
            row.bytes.as_slice(),
            "listing row for line {}",
            row.line
        );
    }
}

/// Disassembling any emitted instruction and re-assembling the text at the
/// same address must reproduce the same bytes.
#[test]
fn disassembly_round_trips_through_the_assembler() {
    let src = "\
        ORG 4000H\n\
        LXI SP,0FFFFH\n\
        LXI H,2000H\n\
        MVI M,42H\n\
        MOV A,M\n\
        MOV B,C\n\
        ADD B\n\
        ADC M\n\
        SUI 10H\n\
        INR A\n\
        DCR M\n\
        INX H\n\
        DAD SP\n\
        DAA\n\
        ANI 0F0H\n\
        XRA A\n\
        ORA M\n\
        CMP C\n\
        RLC\n\
        RAR\n\
        STC\n\
        LDA 1234H\n\
        STA 1235H\n\
        LHLD 2000H\n\
        SHLD 2002H\n\
        LDAX B\n\
        STAX D\n\
        XCHG\n\
        PUSH PSW\n\
        POP B\n\
        XTHL\n\
        SPHL\n\
        PCHL\n\
        JNZ 4000H\n\
        CALL 4000H\n\
        RZ\n\
        RST 5\n\
        IN 00H\n\
        OUT 01H\n\
        EI\n\
        DI\n\
        RIM\n\
        SIM\n\
        NOP\n\
        HLT\n";
    let program = assemble_clean(src);

    let mut addrs: Vec<u16> = program.instruction_addresses().collect();
    addrs.sort_unstable();
    assert!(addrs.len() > 40);

    for addr in addrs {
        let dis = isa::disassemble_at(&program.memory, addr).unwrap();
        let reassembled = assemble(&format!("ORG {}\n{}\n", isa::hex16(addr), dis.text));
        assert!(
            !reassembled.has_errors(),
            "`{}` failed to re-assemble: {:?}",
            dis.text,
            reassembled.diagnostics
        );
        let start = addr as usize;
        let end = start + dis.len as usize;
        assert_eq!(
            &reassembled.memory[start..end],
            &program.memory[start..end],
            "`{}` round-tripped to different bytes",
            dis.text
        );
    }
}

#[test]
fn instruction_info_feeds_hover() {
    let info = isa::instruction_info("DAD");
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].len, 1);
    assert!(info[0].description.contains("HL"));

    // Conditional branches expose both timings for signature help
    let jnz = isa::instruction_info("JNZ")[0];
    assert_eq!(
        jnz.cycles,
        isa::Cycles::Branch {
            taken: 10,
            not_taken: 7
        }
    );
}

#[test]
fn lex_and_parse_errors_share_the_diagnostic_stream() {
    let program = assemble("MVI A,0GGH\nMVI A,\nJMP NOWHERE\n");
    assert_eq!(program.error_count(), 3);
    let codes: Vec<&str> = program.diagnostics.iter().map(|d| d.code).collect();
    assert!(codes.contains(&"lex::bad_lit"));
    assert!(codes.contains(&"parse::missing_operand"));
    assert!(codes.contains(&"asm::undefined_symbol"));
    // Spans point at the offending lines
    assert_eq!(program.diagnostics[0].span.line(), 1);
}

#[test]
fn origin_defaults_to_zero_without_org() {
    let program = assemble_clean("NOP\nHLT\n");
    assert_eq!(program.origin, 0x0000);
    assert_eq!(&program.memory[0..2], &[0x00, 0x76]);
}

#[test]
fn symbols_survive_case_folding() {
    let program = assemble_clean("Loop: NOP\nJMP loop\nHLT\n");
    let symbol = program.symbols.get("LOOP").unwrap();
    assert_eq!(symbol.name, "LOOP");
    assert_eq!(symbol.references.len(), 1);
    assert_eq!(program.symbols_at(1)[0].name, "LOOP");
}
