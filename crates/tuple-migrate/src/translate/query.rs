//! Query Synthesizer: the source queries behind each tuple and match.

use crate::error::{MigrateError, Result};
use crate::model::{Match, Reference};

use super::frame::FrameRef;
use super::reference::{resolve, CurrAnchor, Resolved};
use super::sql::SqlBuilder;

/// Build the query enumerating the source values (currs) that drive one
/// row each of the frame's tuple.
///
/// Uses the references of the tuple's PK match in ascending id order. The
/// first direct reference opens the `SELECT`; an `ALL` value on a direct
/// reference ends the filter list. Indirect references join their
/// referenced table to the referencee. `CURR` reads the parent frame.
pub fn select_currs(frame: &FrameRef<'_>) -> Result<String> {
    let tuple = frame.tuple();
    let pk = tuple
        .pk_match()
        .ok_or_else(|| MigrateError::model(format!("Tuple {} has no PK match", tuple.id)))?;

    let mut refs: Vec<&Reference> = pk.references.iter().collect();
    refs.sort_by_key(|r| r.id);

    let mut sql = SqlBuilder::new();
    let mut is_first_direct = true;
    let mut prev_table: Option<&str> = None;

    for r in refs {
        let referenced_table = r.referenced.table.as_str();
        let referenced_column = r.referenced.qualified();
        let resolved = resolve(&r.referenced_value, frame, CurrAnchor::Parent)?;
        let table_changed = !prev_table.is_some_and(|p| p.eq_ignore_ascii_case(referenced_table));

        if r.is_direct() {
            if is_first_direct {
                let anchor = r.referencee.as_ref().unwrap_or(&r.referenced);
                sql.select(anchor.qualified()).from(anchor.table.as_str());
                is_first_direct = false;
            } else if r.referencee.is_none() && table_changed {
                sql.from(referenced_table);
            }

            match resolved {
                Resolved::All => break,
                Resolved::Equals => {
                    return Err(MigrateError::model(format!(
                        "Reference {} of tuple {}: EQUALS is only valid on indirect references",
                        r.id, tuple.id
                    )));
                }
                values => values.apply(&mut sql, &referenced_column),
            }
        } else {
            let referencee = r.referencee.as_ref().ok_or_else(|| {
                MigrateError::model(format!(
                    "Indirect reference {} of tuple {} has no referencee",
                    r.id, tuple.id
                ))
            })?;
            if table_changed {
                sql.from(referenced_table);
            }
            sql.where_clause(format!(
                "{} = {}",
                referencee.qualified(),
                referenced_column
            ));
            resolved.apply(&mut sql, &referenced_column);
        }

        prev_table = Some(referenced_table);
    }

    if is_first_direct {
        return Err(MigrateError::model(format!(
            "PK match {} of tuple {} has no direct reference to select from",
            pk.id, tuple.id
        )));
    }
    Ok(sql.to_string())
}

/// Build the query fetching the source value of one match. `CURR` reads the
/// current frame.
pub fn select_match(m: &Match, frame: &FrameRef<'_>) -> Result<String> {
    let right = m.right.as_ref().ok_or_else(|| {
        MigrateError::model(format!(
            "Match {} of tuple {} has no source column",
            m.id,
            frame.tuple().id
        ))
    })?;

    let mut refs: Vec<&Reference> = m.references.iter().collect();
    refs.sort_by_key(|r| r.id);

    let mut sql = SqlBuilder::new();
    sql.select(right.qualified()).from(right.table.as_str());

    for r in refs {
        let referenced_column = r.referenced.qualified();
        let resolved = resolve(&r.referenced_value, frame, CurrAnchor::Current)?;
        sql.from(r.referenced.table.as_str());
        if let Some(referencee) = &r.referencee {
            sql.where_clause(format!(
                "{} = {}",
                referencee.qualified(),
                referenced_column
            ));
        }
        resolved.apply(&mut sql, &referenced_column);
    }

    Ok(sql.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;
    use crate::model::MatchingModel;
    use crate::translate::frame::Frames;

    fn tree_from(yaml: &str) -> crate::model::TupleTree {
        MatchingModel::from_yaml(yaml).unwrap().prepare().unwrap().tree
    }

    const MODEL: &str = r#"
tuples:
  - id: 1
    table: person
    matches:
      - id: 1
        left: { table: person, column: person_id }
        right: { table: t_paciente, column: nid }
        default_value: AI
        is_pk: YES
        references:
          - id: 1
            referenced: { table: t_paciente, column: hdd }
            referencee: { table: t_paciente, column: nid }
            referenced_value: "1065 >> 1066"
          - { id: 2, referenced: { table: t_paciente, column: estado }, referenced_value: Activo }
  - id: 2
    parent: 1
    table: obs
    matches:
      - id: 2
        left: { table: obs, column: obs_id }
        right: { table: t_observacao, column: id }
        default_value: AI
        is_pk: YES
        references:
          - id: 1
            referenced: { table: t_observacao, column: nid }
            referencee: { table: t_observacao, column: id }
            referenced_value: CURR
          - id: 2
            referenced: { table: t_consulta, column: id }
            referencee: { table: t_observacao, column: consulta_id }
            referenced_value: EQUALS
            predecessor: 1
          - id: 3
            referenced: { table: t_tipo, column: codigo }
            referencee: { table: t_observacao, column: tipo }
            referenced_value: "PESO << ALTURA"
            predecessor: 1
      - id: 3
        left: { table: obs, column: value_numeric, datatype: DOUBLE }
        right: { table: t_observacao, column: valor }
        references:
          - { id: 1, referenced: { table: t_observacao, column: id }, referenced_value: CURR }
      - id: 4
        left: { table: obs, column: person_id }
        right: { table: t_paciente, column: nid }
        references:
          - id: 1
            referenced: { table: t_paciente, column: nid }
            referencee: { table: t_observacao, column: nid }
            referenced_value: EQUALS
            predecessor: 1
          - { id: 2, referenced: { table: t_observacao, column: id }, referenced_value: CURR }
"#;

    #[test]
    fn test_select_currs_root_with_or_group() {
        let tree = tree_from(MODEL);
        let frames = Frames::new(&tree);
        let sql = select_currs(&FrameRef::new(&tree, &frames, tree.root())).unwrap();
        assert_eq!(
            sql,
            "SELECT t_paciente.nid FROM t_paciente \
             WHERE (t_paciente.hdd = 1065 OR t_paciente.hdd = 1066) AND (t_paciente.estado = 'Activo')"
        );
    }

    #[test]
    fn test_select_currs_child_with_indirect_references() {
        let tree = tree_from(MODEL);
        let mut frames = Frames::new(&tree);
        frames.set_curr(0, Some(SqlValue::from("0101/2014")));
        let sql = select_currs(&FrameRef::new(&tree, &frames, 1)).unwrap();
        assert_eq!(
            sql,
            "SELECT t_observacao.id FROM t_observacao, t_consulta, t_tipo \
             WHERE (t_observacao.nid = '0101/2014' AND t_observacao.consulta_id = t_consulta.id \
             AND t_observacao.tipo = t_tipo.codigo) \
             AND (t_tipo.codigo = 'PESO' OR t_tipo.codigo = 'ALTURA')"
        );
    }

    #[test]
    fn test_select_currs_all_stops_filters() {
        let yaml = MODEL.replace("referenced_value: \"1065 >> 1066\"", "referenced_value: ALL");
        let tree = tree_from(&yaml);
        let frames = Frames::new(&tree);
        let sql = select_currs(&FrameRef::new(&tree, &frames, tree.root())).unwrap();
        assert_eq!(sql, "SELECT t_paciente.nid FROM t_paciente");
    }

    #[test]
    fn test_select_currs_requires_parent_curr() {
        let tree = tree_from(MODEL);
        let frames = Frames::new(&tree);
        assert!(select_currs(&FrameRef::new(&tree, &frames, 1)).is_err());
    }

    #[test]
    fn test_select_match_uses_current_frame() {
        let tree = tree_from(MODEL);
        let mut frames = Frames::new(&tree);
        frames.set_curr(0, Some(SqlValue::from("0101/2014")));
        frames.set_curr(1, Some(SqlValue::Int(77)));
        let frame = FrameRef::new(&tree, &frames, 1);
        let tuple = frame.tuple();

        let sql = select_match(&tuple.matches[1], &frame).unwrap();
        assert_eq!(
            sql,
            "SELECT t_observacao.valor FROM t_observacao WHERE (t_observacao.id = 77)"
        );

        let sql = select_match(&tuple.matches[2], &frame).unwrap();
        assert_eq!(
            sql,
            "SELECT t_paciente.nid FROM t_paciente, t_observacao \
             WHERE (t_observacao.nid = t_paciente.nid AND t_observacao.id = 77)"
        );
    }

    #[test]
    fn test_select_match_without_source_is_error() {
        let tree = tree_from(MODEL);
        let frames = Frames::new(&tree);
        let frame = FrameRef::new(&tree, &frames, 1);
        let mut m = frame.tuple().matches[1].clone();
        m.right = None;
        assert!(select_match(&m, &frame).is_err());
    }
}
